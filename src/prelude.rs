pub use std::time::Duration;

pub use async_trait::async_trait;
pub use log::*;

pub use crate::bot::{BotContext, ChatLine, CommandHandler, ControlRequest, HandlerKind, HandlerRegistry, HandlerSeed};
pub use crate::error::HandlerError;
pub use crate::irc;
pub use crate::permissions::PermissionLevel;
pub use crate::speech::{Responder, SpeechRequest};
pub use crate::storage::{load_as, save_as, Store};
pub use crate::timer::TimerHandle;
pub use crate::tmi::{ChatFact, UserNotice};
