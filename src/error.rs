use thiserror::Error;

/// Errors produced while decoding a single IRC line.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("command expected")]
    MissingCommand,
}

/// Errors produced by the persistent document store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The single recoverable error class for command handlers. A handler
/// returning this gets logged and skipped; the dispatch pass goes on
/// with the remaining handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> HandlerError {
        HandlerError::Failed(message.into())
    }
}

/// Startup-time configuration faults. These are fatal: a bot with a
/// wrong config should refuse to come up rather than limp along.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("unknown command '{name}' in roster for channel '{channel}'")]
    UnknownCommand { name: String, channel: String },
    #[error("storage: {0}")]
    Store(#[from] StoreError),
    #[error("command '{name}' failed to initialize: {source}")]
    CommandInit {
        name: String,
        #[source]
        source: HandlerError,
    },
    #[error("invalid server url: {0}")]
    BadServerUrl(String),
}
