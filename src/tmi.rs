//! Interpretation of twitch-specific message tags.

use std::collections::HashMap;

use crate::irc::Tags;

/// Facts about a single PRIVMSG, derived from its tags once and then
/// handed read-only to every command handler interested in the line.
#[derive(Debug, Clone, Default)]
pub struct ChatFact {
    pub display_name: String,
    pub user_id: Option<String>,
    pub is_mod: bool,
    pub is_sub: bool,
    pub is_broadcaster: bool,
    pub emote_only: bool,
    /// emote id -> number of occurrences in the message.
    pub emotes: HashMap<String, usize>,
}

impl ChatFact {
    /// Builds the fact sheet for a message sent by `login`.
    ///
    /// Missing tags degrade to the "ordinary viewer" reading: no badges,
    /// no emotes, display name equal to the login.
    pub fn from_tags(tags: &Tags<'_>, login: &str) -> ChatFact {
        let tag = |key: &str| tags.get(key).map(|v| v.as_ref()).unwrap_or("");

        let display_name = match tag("display-name") {
            "" => login.to_string(),
            name => name.to_string(),
        };

        ChatFact {
            display_name,
            user_id: match tag("user-id") {
                "" => None,
                id => Some(id.to_string()),
            },
            is_mod: tag("mod") == "1",
            is_sub: tag("subscriber") == "1",
            is_broadcaster: tag("badges").contains("broadcaster"),
            emote_only: tag("emote-only") == "1",
            emotes: parse_emotes(tag("emotes")),
        }
    }

    /// Total number of emote occurrences in the message.
    pub fn emote_count(&self) -> usize {
        self.emotes.values().sum()
    }
}

/// Parses the `emotes` tag: `/`-separated groups of `emote_id:range,range,...`.
///
/// Each range is `start-end`, so the occurrence count of an emote equals the
/// number of dashes in its range list. An empty tag produces an empty map.
fn parse_emotes(raw: &str) -> HashMap<String, usize> {
    let mut emotes = HashMap::new();
    for group in raw.split('/') {
        let mut iter = group.splitn(2, ':');
        let id = iter.next().unwrap();
        if id.is_empty() {
            continue;
        }
        if let Some(ranges) = iter.next() {
            let count = ranges.matches('-').count();
            if count > 0 {
                emotes.insert(id.to_string(), count);
            }
        }
    }
    emotes
}

/// Classified USERNOTICE event. Twitch multiplexes subs, resubs, raids and
/// rituals over this one verb, discriminated by the `msg-id` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum UserNotice {
    Raid { viewers: u64 },
    Ritual,
    Sub,
    Resub { months: Option<u64> },
    Unknown(String),
}

impl UserNotice {
    pub fn classify(tags: &Tags<'_>) -> UserNotice {
        let tag = |key: &str| tags.get(key).map(|v| v.as_ref()).unwrap_or("");

        match tag("msg-id") {
            "raid" => UserNotice::Raid {
                viewers: tag("msg-param-viewerCount").parse().unwrap_or(0),
            },
            "ritual" => UserNotice::Ritual,
            "sub" => UserNotice::Sub,
            "resub" => UserNotice::Resub {
                months: tag("msg-param-cumulative-months").parse().ok(),
            },
            other => UserNotice::Unknown(other.to_string()),
        }
    }
}

/// Name to credit a USERNOTICE to: display name when set, else the login tag.
pub fn notice_author<'a>(tags: &'a Tags<'_>) -> Option<&'a str> {
    match tags.get("display-name").map(|v| v.as_ref()) {
        Some(name) if !name.is_empty() => Some(name),
        _ => match tags.get("login").map(|v| v.as_ref()) {
            Some(login) if !login.is_empty() => Some(login),
            _ => None,
        },
    }
}
