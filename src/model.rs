pub use async_std::net::TcpStream;
pub use async_std::sync::Mutex;
pub use std::sync::Arc;

/// Slot holding the currently connected socket. The reconnect loop fills it
/// on connect and empties it on loss, the sender funnel writes through it.
pub type SharedSink = Arc<Mutex<Option<TcpStream>>>;

/// A chat message bound for a channel, not yet wrapped into an IRC line.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMessage {
    pub channel: String,
    pub message: String,
}

/// Everything the main event loop reacts to. Reader tasks produce `Line`
/// and close with `Disconnected`, timers produce `Tick`.
#[derive(Debug)]
pub enum Event {
    Line(String),
    Tick(Tick),
    Disconnected,
}

/// A scheduled timer firing for one handler of one channel.
#[derive(Debug, Clone)]
pub struct Tick {
    pub channel: String,
    pub handler: String,
}
