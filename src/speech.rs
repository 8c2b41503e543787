//! Conversational replies, produced off the dispatch path.

use std::sync::mpsc;
use std::thread;

use futures::channel::mpsc::Sender;
use log::warn;

use crate::model::PreparedMessage;

/// Produces a reply to a chat message addressed at the bot.
///
/// Implementations may be arbitrarily slow. They run on a dedicated worker
/// thread and never block chat dispatch; whatever they produce goes through
/// the regular outgoing funnel like any other message.
pub trait Responder: Send {
    fn respond(&mut self, user: &str, message: &str) -> Option<String>;
}

/// One message handed to the speech worker.
#[derive(Debug)]
pub struct SpeechRequest {
    pub channel: String,
    pub user: String,
    pub text: String,
}

pub type SpeechSender = mpsc::Sender<SpeechRequest>;

/// Starts the speech worker thread and returns its inbox.
pub fn spawn_worker(mut responder: Box<dyn Responder>, mut tx_message: Sender<PreparedMessage>) -> SpeechSender {
    let (tx, rx) = mpsc::channel::<SpeechRequest>();

    thread::spawn(move || {
        for request in rx {
            if let Some(reply) = responder.respond(&request.user, &request.text) {
                let message = PreparedMessage {
                    channel: request.channel,
                    message: format!("@{}, {}", request.user, reply),
                };
                if let Err(e) = tx_message.try_send(message) {
                    warn!("Dropping speech reply: {}", e);
                }
            }
        }
    });

    tx
}
