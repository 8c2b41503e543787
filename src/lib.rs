use std::sync::Arc;
use std::time::Duration;

use async_std::task;

use futures::channel::mpsc::channel;

use log::*;
use url::Url;

pub mod bot;
pub mod config;
pub mod error;
pub mod irc;
pub mod model;
pub mod permissions;
pub mod prelude;
pub mod speech;
pub mod storage;
pub mod tags;
pub mod timer;
pub mod tmi;

mod cooldown;
mod history;
mod messaging;
mod util;

use bot::{Bot, HandlerRegistry, Writer};
use config::Config;
use error::ConfigError;
use messaging::MessagingState;
use model::{Mutex, SharedSink};
use speech::Responder;
use storage::Store;
use timer::TimerService;

/// Brings the whole bot up and blocks until the process dies.
///
/// Bots are constructed before anything is spawned, so a roster naming an
/// unknown command or a handler that cannot initialize is fatal here rather
/// than after the connection is up.
pub fn run(
    server: Url,
    username: String,
    password: String,
    config: Config,
    registry: HandlerRegistry,
    store: Arc<dyn Store>,
    responder: Option<Box<dyn Responder>>,
) -> Result<(), ConfigError> {
    let channels = config.channels();

    let (tx_event, rx_event) = channel(1024);
    let (tx_message, rx_message) = channel(1024);

    let registry = Arc::new(registry);
    let sink: SharedSink = Arc::new(Mutex::new(None));

    let speech = responder.map(|r| speech::spawn_worker(r, tx_message.clone()));

    let messaging_state = MessagingState::new(
        &channels,
        Duration::from_secs(config.send_cooldown_secs),
        Duration::from_secs(30),
    );
    let cooldowns = messaging_state.cooldowns.clone();

    let mut bots = Vec::with_capacity(config.bots.len());
    for bot_config in &config.bots {
        let channel = bot_config.channel.clone();
        bots.push(Bot::new(
            bot_config.clone(),
            registry.clone(),
            store.clone(),
            Writer::new(&channel, tx_message.clone()),
            TimerService::new(tx_event.clone()),
            &username,
            speech.clone(),
        )?);
    }

    info!("Running {} bot(s): {:?}", bots.len(), channels);

    // Message sending loop
    task::spawn(messaging::sender_event_loop(rx_message, sink.clone(), messaging_state));

    // Main loop
    task::block_on(messaging::session_loop(
        server, username, password, bots, sink, cooldowns, tx_event, rx_event,
    ))
}
