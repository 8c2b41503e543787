use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_std::net::TcpStream;
use async_std::task;

use futures::channel::mpsc::{Receiver, Sender};
use futures::io::BufReader;
use futures::{AsyncBufReadExt, AsyncWriteExt, SinkExt, StreamExt};

use log::*;
use url::Url;

use crate::bot::Bot;
use crate::cooldown::{CooldownState, CooldownTracker};
use crate::error::ConfigError;
use crate::history::History;
use crate::irc::{self, MessageBuilder};
use crate::model::{Event, PreparedMessage, SharedSink};
use crate::tmi::{self, ChatFact, UserNotice};
use crate::util::modify_message;

pub struct MessagingState {
    pub cooldowns: Arc<CooldownTracker<String>>,
    pub history: History<String, String>,
}

impl MessagingState {
    pub fn new(channels: &[String], initial_cooldown: Duration, history_ttl: Duration) -> MessagingState {
        MessagingState {
            cooldowns: Arc::new(CooldownTracker::new(
                channels.iter().map(|c| (c.clone(), initial_cooldown)).collect(),
            )),
            history: History::new(channels.to_vec(), history_ttl),
        }
    }
}

/// Reconnect pacing. The wait doubles on every spent delay, capped at 512
/// seconds, and snaps back to one second once a connection reaches
/// signed-on state.
pub struct Backoff {
    wait: u64,
}

impl Backoff {
    pub fn new() -> Backoff {
        Backoff { wait: 1 }
    }

    /// Returns the current wait and doubles it for next time.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_secs(self.wait);
        self.wait = (self.wait * 2).min(512);
        delay
    }

    pub fn reset(&mut self) {
        self.wait = 1;
    }
}

impl Default for Backoff {
    fn default() -> Backoff {
        Backoff::new()
    }
}

/// Writes one line to the socket, CRLF-terminated.
async fn send_raw(stream: &mut TcpStream, line: &str) -> std::io::Result<()> {
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(b"\r\n").await
}

/// Connects and signs on: credentials, capability requests, channel joins.
async fn connect(
    host: &str,
    port: u16,
    username: &str,
    password: &str,
    channels: &BTreeSet<String>,
) -> std::io::Result<TcpStream> {
    let mut stream = TcpStream::connect((host, port)).await?;

    send_raw(&mut stream, &format!("PASS oauth:{}", password)).await?;
    send_raw(&mut stream, &format!("NICK {}", username)).await?;

    for cap in &["twitch.tv/membership", "twitch.tv/commands", "twitch.tv/tags"] {
        let req = MessageBuilder::new("CAP").with_arg("REQ").with_trailing(cap).string();
        send_raw(&mut stream, &req).await?;
    }

    for channel in channels {
        send_raw(&mut stream, &format!("JOIN #{}", channel)).await?;
    }

    Ok(stream)
}

/// This function acts as event loop for reading lines from the socket.
///
/// It ends when the connection drops, reporting the loss through the event
/// channel so the main loop can reconnect.
async fn receiver_event_loop(stream: TcpStream, mut tx_event: Sender<Event>) {
    let mut lines = BufReader::new(stream).lines();

    while let Some(line) = lines.next().await {
        match line {
            Ok(line) => {
                if let Err(e) = tx_event.send(Event::Line(line)).await {
                    error!("Failed to submit line: {}", e);
                    return;
                }
            }
            Err(e) => {
                error!("Receive error: {}", e);
                break;
            }
        }
    }

    let _ = tx_event.send(Event::Disconnected).await;
}

/// This function acts as event loop for sending messages to the socket.
///
/// One message at a time: per-channel cooldown first, then the duplicate
/// check, then the write. A message for a channel the funnel does not track
/// is dropped.
pub(crate) async fn sender_event_loop(
    mut rx_message: Receiver<PreparedMessage>,
    sink: SharedSink,
    mut state: MessagingState,
) {
    while let Some(mut message) = rx_message.next().await {
        // 1. consult cooldown tracker
        let mut known = true;
        loop {
            match state.cooldowns.access(&message.channel) {
                Some(CooldownState::Ready) => break,
                Some(CooldownState::NotReady(how_long)) => task::sleep(how_long).await,
                None => {
                    known = false;
                    break;
                }
            }
        }
        if !known {
            error!("No such channel: {}", message.channel);
            continue;
        }

        // 2. consult message history
        match state.history.contains(&message.channel, &message.message) {
            Some(0) => {
                state.history.push(&message.channel, message.message.clone());
            }
            Some(n) => modify_message(&mut message.message, n - 1),
            None => {
                error!("No such channel: {}", message.channel);
                continue;
            }
        }

        // 3. prepare message
        let channel = format!("#{}", message.channel);
        let text = MessageBuilder::new("PRIVMSG")
            .with_arg(&channel)
            .with_trailing(&message.message)
            .string();

        // 4. send message
        info!("Sending message: {:?}", text);
        let mut guard = sink.lock().await;
        match guard.as_mut() {
            Some(stream) => {
                if let Err(e) = send_raw(stream, &text).await {
                    error!("Failed to send message: {}", e);
                }
            }
            None => warn!("Not connected, dropping message: {:?}", text),
        }
    }
}

/// Per-connection protocol driver. Owns the bots and routes parsed messages
/// to the instances responsible for the channel, by exact name.
struct Session {
    username: String,
    bots: Vec<Bot>,
    sink: SharedSink,
    cooldowns: Arc<CooldownTracker<String>>,
}

impl Session {
    /// Consumes events until the connection is reported lost. Lines and
    /// ticks are handled one at a time, which keeps dispatch serialized and
    /// per-channel ordering intact.
    async fn drive(&mut self, rx_event: &mut Receiver<Event>, backoff: &mut Backoff) {
        while let Some(event) = rx_event.next().await {
            match event {
                Event::Line(line) => self.handle_line(&line, backoff).await,
                Event::Tick(tick) => {
                    for bot in self.bots.iter_mut().filter(|b| b.channel() == tick.channel) {
                        bot.on_tick(&tick.handler).await;
                    }
                }
                Event::Disconnected => {
                    warn!("Connection lost");
                    return;
                }
            }
        }
    }

    async fn handle_line(&mut self, raw: &str, backoff: &mut Backoff) {
        let message = match irc::Message::parse(raw) {
            Ok(message) => message,
            Err(err) => {
                error!("Error parsing message: {} (message = {})", err, raw);
                return;
            }
        };

        match message.command.as_str() {
            "privmsg" => {
                let channel = match message.first_arg_as_channel_name() {
                    Some(channel) => channel,
                    None => {
                        error!("PRIVMSG without a channel: {}", raw);
                        return;
                    }
                };
                let user = message.prefix.nick().unwrap_or("");
                let text = message.trailing().unwrap_or("");
                let fact = ChatFact::from_tags(&message.tags, user);
                for bot in self.bots.iter_mut().filter(|b| b.channel() == channel) {
                    bot.process_line(user, text, &fact).await;
                }
            }
            "ping" => {
                info!("responding to PING...");
                let pong = MessageBuilder::new("PONG")
                    .with_trailing(message.trailing().unwrap_or(""))
                    .string();
                self.send_now(&pong).await;
            }
            "001" => {
                info!("Signed on as {}", self.username);
                backoff.reset();
            }
            "join" => {
                if let (Some(channel), Some(user)) = (message.first_arg_as_channel_name(), message.prefix.nick()) {
                    for bot in self.bots.iter_mut().filter(|b| b.channel() == channel) {
                        bot.on_join(user);
                    }
                }
            }
            "part" => {
                if let (Some(channel), Some(user)) = (message.first_arg_as_channel_name(), message.prefix.nick()) {
                    for bot in self.bots.iter_mut().filter(|b| b.channel() == channel) {
                        bot.on_part(user);
                    }
                }
            }
            "mode" => {
                // :jtv MODE #channel +o login
                let is_mod = match message.args.get(1).map(|f| f.as_ref()) {
                    Some("+o") => true,
                    Some("-o") => false,
                    _ => return,
                };
                if let (Some(channel), Some(user)) = (
                    message.first_arg_as_channel_name(),
                    message.args.get(2).map(|u| u.as_ref()),
                ) {
                    for bot in self.bots.iter_mut().filter(|b| b.channel() == channel) {
                        bot.on_mode(user, is_mod);
                    }
                }
            }
            "userstate" => {
                if let Some(channel) = message.first_arg_as_channel_name() {
                    let fact = ChatFact::from_tags(&message.tags, &self.username);
                    for bot in self.bots.iter_mut().filter(|b| b.channel() == channel) {
                        bot.on_userstate(&fact);
                    }
                }
            }
            "usernotice" => {
                if let Some(channel) = message.first_arg_as_channel_name() {
                    let notice = UserNotice::classify(&message.tags);
                    let author = tmi::notice_author(&message.tags).unwrap_or("someone").to_string();
                    for bot in self.bots.iter_mut().filter(|b| b.channel() == channel) {
                        bot.on_usernotice(notice.clone(), &author).await;
                    }
                }
            }
            "clearchat" => {
                if let Some(channel) = message.first_arg_as_channel_name() {
                    let target = message.trailing();
                    for bot in self.bots.iter_mut().filter(|b| b.channel() == channel) {
                        bot.on_clearchat(target);
                    }
                }
            }
            "hosttarget" => {
                info!("Host target change: {}", message.trailing().unwrap_or(raw));
            }
            "notice" => {
                info!("Server notice: {}", message.trailing().unwrap_or(raw));
            }
            "whisper" => {
                let from = message.prefix.nick().unwrap_or("?");
                info!("Whisper from {}: {}", from, message.trailing().unwrap_or(""));
            }
            "roomstate" => {
                if let (Some(channel), Some(slow)) = (message.first_arg_as_channel_name(), message.tag_value("slow"))
                {
                    if let Ok(seconds) = slow.parse::<u64>() {
                        let cooldown = Duration::from_secs(seconds.max(1));
                        self.cooldowns.update(&channel.to_string(), cooldown);
                        info!("[{}] slow mode is {}s, send cooldown adjusted", channel, seconds);
                    }
                }
            }
            "reconnect" => {
                warn!("Server requested reconnect");
                self.shutdown_current().await;
            }
            "002" | "003" | "004" | "353" | "366" | "372" | "375" | "376" | "cap" => {
                debug!("{}", raw);
            }
            cmd => info!("no handler for command {} / {}", cmd, message),
        }
    }

    async fn send_now(&self, line: &str) {
        let mut guard = self.sink.lock().await;
        match guard.as_mut() {
            Some(stream) => {
                if let Err(e) = send_raw(stream, line).await {
                    error!("Failed to send message: {}", e);
                }
            }
            None => warn!("Not connected, dropping message: {:?}", line),
        }
    }

    /// Forces the current socket closed. The reader task notices and reports
    /// the loss through the regular event path, so there is exactly one way
    /// a connection ends.
    async fn shutdown_current(&self) {
        let guard = self.sink.lock().await;
        if let Some(stream) = guard.as_ref() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

/// This function acts as the main event loop of the bot process.
///
/// It keeps one connection alive, feeds its lines through the serialized
/// dispatch path, and reconnects with exponential backoff when the
/// connection is lost.
pub(crate) async fn session_loop(
    server: Url,
    username: String,
    password: String,
    bots: Vec<Bot>,
    sink: SharedSink,
    cooldowns: Arc<CooldownTracker<String>>,
    tx_event: Sender<Event>,
    mut rx_event: Receiver<Event>,
) -> Result<(), ConfigError> {
    let host = server
        .host_str()
        .ok_or_else(|| ConfigError::BadServerUrl(server.to_string()))?
        .to_string();
    let port = server.port().unwrap_or(6667);
    let channels: BTreeSet<String> = bots.iter().map(|b| b.channel().to_string()).collect();

    let mut session = Session {
        username,
        bots,
        sink,
        cooldowns,
    };
    let mut backoff = Backoff::new();

    loop {
        info!("Connecting to {}:{}", host, port);
        let stream = match connect(&host, port, &session.username, &password, &channels).await {
            Ok(stream) => stream,
            Err(e) => {
                let delay = backoff.next_delay();
                error!("Connection failed: {}; retrying in {:?}", e, delay);
                task::sleep(delay).await;
                continue;
            }
        };

        *session.sink.lock().await = Some(stream.clone());
        task::spawn(receiver_event_loop(stream, tx_event.clone()));

        session.drive(&mut rx_event, &mut backoff).await;

        // Loss reconnects immediately; only failed connect attempts back off.
        *session.sink.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::{HandlerRegistry, Writer};
    use crate::config::BotConfig;
    use crate::model::Mutex;
    use crate::storage::MemStore;
    use crate::timer::TimerService;
    use futures::channel::mpsc::channel as mpsc_channel;
    use std::collections::HashMap;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new();

        let mut delays = Vec::new();
        for _ in 0..12 {
            delays.push(backoff.next_delay().as_secs());
        }

        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 512, 512, 512]);
    }

    #[test]
    fn test_backoff_resets_to_one() {
        let mut backoff = Backoff::new();
        for _ in 0..6 {
            backoff.next_delay();
        }

        backoff.reset();
        assert_eq!(backoff.next_delay().as_secs(), 1);
        assert_eq!(backoff.next_delay().as_secs(), 2);
    }

    fn test_bot(channel: &str) -> Bot {
        let (tx_message, _rx_message) = mpsc_channel(16);
        let (tx_event, _rx_event) = mpsc_channel(16);
        Bot::new(
            BotConfig {
                channel: channel.to_string(),
                owners: vec![],
                commands: vec![],
                prefix: ">>".to_string(),
                pleb_cooldown_secs: 10,
                raid_announce_threshold: 10,
            },
            Arc::new(HandlerRegistry::new()),
            Arc::new(MemStore::new()),
            Writer::new(channel, tx_message),
            TimerService::new(tx_event),
            "tmibot",
            None,
        )
        .expect("Failed to construct bot")
    }

    fn test_session(channels: &[&str]) -> Session {
        Session {
            username: "tmibot".to_string(),
            bots: channels.iter().map(|c| test_bot(c)).collect(),
            sink: Arc::new(Mutex::new(None)),
            cooldowns: Arc::new(CooldownTracker::new(HashMap::new())),
        }
    }

    #[test]
    fn test_privmsg_routed_by_exact_channel_name() {
        let mut session = test_session(&["chan", "chan2"]);
        let mut backoff = Backoff::new();

        task::block_on(session.handle_line(":somebody!somebody@host PRIVMSG #chan :hello there", &mut backoff));

        assert!(session.bots[0].context().presence.users.contains("somebody"));
        assert_eq!(session.bots[0].context().points.get("somebody"), 1);
        // "chan2" must not see traffic for "chan"
        assert!(!session.bots[1].context().presence.users.contains("somebody"));
    }

    #[test]
    fn test_membership_events_update_presence() {
        let mut session = test_session(&["chan"]);
        let mut backoff = Backoff::new();

        task::block_on(async {
            session
                .handle_line(":somebody!somebody@host JOIN #chan", &mut backoff)
                .await;
            session.handle_line(":jtv MODE #chan +o somebody", &mut backoff).await;
        });

        assert!(session.bots[0].context().presence.users.contains("somebody"));
        assert!(session.bots[0].context().presence.mods.contains("somebody"));

        task::block_on(async {
            session.handle_line(":jtv MODE #chan -o somebody", &mut backoff).await;
            session
                .handle_line(":somebody!somebody@host PART #chan", &mut backoff)
                .await;
        });

        assert!(!session.bots[0].context().presence.mods.contains("somebody"));
        assert!(!session.bots[0].context().presence.users.contains("somebody"));
    }

    #[test]
    fn test_signon_resets_backoff() {
        let mut session = test_session(&[]);
        let mut backoff = Backoff::new();
        for _ in 0..5 {
            backoff.next_delay();
        }

        task::block_on(session.handle_line(":tmi.twitch.tv 001 tmibot :Welcome, GLHF!", &mut backoff));

        assert_eq!(backoff.next_delay().as_secs(), 1);
    }

    #[test]
    fn test_garbage_line_is_survivable() {
        let mut session = test_session(&["chan"]);
        let mut backoff = Backoff::new();

        task::block_on(async {
            session.handle_line("", &mut backoff).await;
            session.handle_line("@tags-and-nothing-else", &mut backoff).await;
            session
                .handle_line(":somebody!somebody@host PRIVMSG #chan :still alive", &mut backoff)
                .await;
        });

        assert!(session.bots[0].context().presence.users.contains("somebody"));
    }
}
