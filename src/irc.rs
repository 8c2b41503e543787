use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::error::ParseError;
use crate::tags;

/// Tag values are unescaped during parsing. A key without a value maps
/// to an empty string; unknown keys pass through untouched.
pub type Tags<'a> = BTreeMap<&'a str, Cow<'a, str>>;

/// Prefix part of an IRC message. Roughly corresponds to what is meant by "prefix"
/// in RFC1459 (see `Message` description for more info)
#[derive(Debug, PartialEq)]
pub enum Prefix<'a> {
    Full {
        nick: &'a str,
        user: &'a str,
        host: &'a str,
    },
    UserHost {
        user: &'a str,
        host: &'a str,
    },
    Host(&'a str),
    None,
}

impl<'a> Prefix<'a> {
    /// Nick part of a full prefix. On twitch this is the sender's login.
    pub fn nick(&self) -> Option<&'a str> {
        match self {
            Prefix::Full { nick, .. } => Some(nick),
            _ => None,
        }
    }
}

impl Default for Prefix<'_> {
    fn default() -> Self {
        Prefix::None
    }
}

impl Display for Prefix<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Prefix::Full { nick, user, host } => f.write_fmt(format_args!(":{}!{}@{}", nick, user, host)),
            Prefix::UserHost { user, host } => f.write_fmt(format_args!(":{}@{}", user, host)),
            Prefix::Host(host) => f.write_fmt(format_args!(":{}", host)),
            Prefix::None => Ok(()),
        }
    }
}

/// Structure representing a message in IRC chat.
///
/// The command name is normalized to lowercase during parsing, so numeric
/// replies and verbs can be matched uniformly. A trailing part, when present,
/// becomes the last element of `args` with its leading ':' stripped, which
/// means the text of a PRIVMSG is always `args.last()` no matter how it was
/// framed on the wire.
///
/// Note, that this structure and the parser code do not precisely implement
/// all of the corresponding IRC RFCs. Restrictions RFC places on entities
/// such as usernames, tag keys/values, prefixes, hostnames, etc. may or may
/// not be enforced.
#[derive(Debug)]
pub struct Message<'a> {
    pub tags: Tags<'a>,
    pub prefix: Prefix<'a>,
    pub command: String,
    pub args: Vec<Cow<'a, str>>,
    has_trailing: bool,
}

impl Message<'_> {
    /// Parses a string into a Twitch IRC message.
    pub fn parse(raw: &str) -> Result<Message<'_>, ParseError> {
        fn parse_tags(raw_tags: &str) -> Tags {
            // tags are conveniently separated by a semicolon
            let mut tags = Tags::new();
            for pair in raw_tags.split(';') {
                if !pair.is_empty() {
                    let mut iter = pair.splitn(2, '=');
                    let key = iter.next().unwrap();
                    let val = iter.next().unwrap_or("");
                    tags.insert(key, tags::unescape(val));
                }
            }
            tags
        }

        fn parse_prefix(prefix: &str) -> Prefix {
            // we support three types of prefix: Full, UserHost, and Host
            // full is a prefix of form <nick>!<user>@<host>
            // user-host is a prefix of form <user>@<host>
            // host is simply a <host>
            let mut iter = prefix.rsplitn(2, '@');
            let host = iter.next().unwrap();
            match iter.next() {
                Some(nick_and_user) => {
                    let mut iter = nick_and_user.rsplitn(2, '!');
                    let user = iter.next().unwrap();
                    match iter.next() {
                        Some(nick) => Prefix::Full { nick, user, host },
                        None => Prefix::UserHost { user, host },
                    }
                }
                None => Prefix::Host(host),
            }
        }

        let mut message = Message::default();
        let mut raw = raw;

        if raw.chars().next().ok_or(ParseError::UnexpectedEnd)? == '@' {
            // the next space will designate end of IRCv3 tags
            let tag_end = raw.find(' ').ok_or(ParseError::UnexpectedEnd)?;

            message.tags = parse_tags(&raw[1..tag_end]);

            raw = &raw[tag_end + 1..];
        }

        if raw.chars().next().ok_or(ParseError::UnexpectedEnd)? == ':' {
            // the next space will designate end of IRC prefix
            let prefix_end = raw.find(' ').ok_or(ParseError::UnexpectedEnd)?;

            message.prefix = parse_prefix(&raw[1..prefix_end]);

            raw = &raw[prefix_end + 1..];
        }

        let (raw, trailing) = match raw.find(" :") {
            Some(idx) => {
                // we found the trailing part
                let (raw, trailing) = raw.split_at(idx);
                (raw, Some(&trailing[2..]))
            }
            None => (raw, None),
        };

        let mut command_and_params = raw.split(' ');

        let name = command_and_params.next().ok_or(ParseError::MissingCommand)?;
        if name.is_empty() {
            return Err(ParseError::MissingCommand);
        }
        message.command = name.to_ascii_lowercase();
        message.args = command_and_params
            .filter(|x| !x.is_empty())
            .map(Cow::Borrowed)
            .collect();

        if let Some(trailing) = trailing {
            message.args.push(Cow::Borrowed(trailing));
            message.has_trailing = true;
        }

        Ok(message)
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(|v| v.as_ref())
    }

    pub fn first_arg_as_channel_name(&self) -> Option<&str> {
        self.args.first().map(|s| s.trim_start_matches('#'))
    }

    /// The trailing part, if the message had one. For PRIVMSG this is the
    /// chat text.
    pub fn trailing(&self) -> Option<&str> {
        if self.has_trailing {
            self.args.last().map(|s| s.as_ref())
        } else {
            None
        }
    }
}

impl Default for Message<'_> {
    fn default() -> Self {
        Message {
            tags: Tags::default(),
            prefix: Prefix::default(),
            command: String::default(),
            args: Vec::default(),
            has_trailing: false,
        }
    }
}

impl Display for Message<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        if !self.tags.is_empty() {
            f.write_str("@")?;

            for (i, (k, v)) in self.tags.iter().enumerate() {
                if v.is_empty() {
                    f.write_str(k)?;
                } else {
                    f.write_fmt(format_args!("{}={}", k, tags::escape(v)))?;
                }
                if i < self.tags.len() - 1 {
                    f.write_str(";")?;
                }
            }

            f.write_str(" ")?;
        }

        match &self.prefix {
            Prefix::None => {}
            prefix => {
                prefix.fmt(f)?;
                f.write_str(" ")?;
            }
        }

        f.write_str(&self.command)?;

        for (i, arg) in self.args.iter().enumerate() {
            if self.has_trailing && i == self.args.len() - 1 {
                f.write_fmt(format_args!(" :{}", arg))?;
            } else {
                f.write_fmt(format_args!(" {}", arg))?;
            }
        }

        Ok(())
    }
}

pub struct MessageBuilder<'a> {
    message: Message<'a>,
}

impl<'a> MessageBuilder<'a> {
    pub fn new(command_name: &str) -> MessageBuilder<'a> {
        MessageBuilder {
            message: {
                let mut msg = Message::default();
                msg.command = command_name.to_string();
                msg
            },
        }
    }

    pub fn with_arg(mut self, arg: &'a str) -> MessageBuilder<'a> {
        self.message.args.push(Cow::Borrowed(arg));
        self
    }

    pub fn with_tag(mut self, key: &'a str, value: Option<&'a str>) -> MessageBuilder<'a> {
        self.message.tags.insert(key, Cow::Borrowed(value.unwrap_or("")));
        self
    }

    pub fn with_prefix(mut self, prefix: Prefix<'a>) -> MessageBuilder<'a> {
        self.message.prefix = prefix;
        self
    }

    /// Appends the trailing part. Must be the last argument added.
    pub fn with_trailing(mut self, trailing: &'a str) -> MessageBuilder<'a> {
        self.message.args.push(Cow::Borrowed(trailing));
        self.message.has_trailing = true;
        self
    }

    pub fn string(self) -> String {
        format!("{}", self.message)
    }
}
