use std::path::PathBuf;
use std::sync::Arc;

use structopt::StructOpt;
use url::Url;

use bot::config::Config;
use bot::storage::JsonFileStore;

mod commands;
mod responder;

#[derive(StructOpt)]
#[structopt(about = "primitive twitch bot")]
struct Opt {
    /// Path to the bot configuration file
    #[structopt(long, default_value = "bot.json")]
    config: PathBuf,

    /// Directory for persistent state (points, grants, lists)
    #[structopt(long, default_value = "data")]
    data_dir: PathBuf,

    /// Chat server to connect to
    #[structopt(long, default_value = "irc://irc.chat.twitch.tv:6667")]
    server: Url,
}

fn main() {
    let opt: Opt = Opt::from_args();

    env_logger::try_init().expect("Failed to initialize logger");

    let username = std::env::var("TWITCH_USERNAME").expect("twitch username");

    let password = std::env::var("TWITCH_OAUTH_TOKEN").expect("twitch oauth token");

    let config = Config::load(&opt.config).expect("Failed to load config");

    let store = Arc::new(JsonFileStore::new(opt.data_dir));

    let responder: Option<Box<dyn bot::speech::Responder>> = Some(Box::new(responder::SmallTalk::new()));

    if let Err(e) = bot::run(
        opt.server,
        username,
        password,
        config,
        commands::registry(),
        store,
        responder,
    ) {
        eprintln!("fatal: {}", e);
        std::process::exit(1);
    }
}
