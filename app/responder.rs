use bot::prelude::*;

use rand::seq::SliceRandom;

/// Canned small talk for when somebody @-mentions the bot.
///
/// Stands in for a slow external language service; it happens to answer
/// instantly, but it still runs on the speech worker thread like any other
/// `Responder`.
pub struct SmallTalk {
    greetings: Vec<&'static str>,
    answers: Vec<&'static str>,
    remarks: Vec<&'static str>,
}

impl SmallTalk {
    pub fn new() -> SmallTalk {
        SmallTalk {
            greetings: vec!["hi!", "hello there", "hey, good to see you"],
            answers: vec![
                "hard to say",
                "I would not bet on it",
                "signs point to yes",
                "ask me again after the next raid",
            ],
            remarks: vec!["that's me", "you called?", "I'm listening"],
        }
    }
}

impl Responder for SmallTalk {
    fn respond(&mut self, _user: &str, message: &str) -> Option<String> {
        let text = message.to_lowercase();
        let pool = if text.contains("hello") || text.contains("hi ") || text.ends_with(" hi") {
            &self.greetings
        } else if text.contains('?') {
            &self.answers
        } else {
            &self.remarks
        };
        pool.choose(&mut rand::thread_rng()).map(|reply| reply.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_questions_get_an_answer() {
        let mut responder = SmallTalk::new();
        let reply = responder.respond("somebody", "@tmibot will it work?").unwrap();
        assert!(responder.answers.contains(&reply.as_str()));
    }

    #[test]
    fn test_greetings_get_a_greeting() {
        let mut responder = SmallTalk::new();
        let reply = responder.respond("somebody", "hello @tmibot").unwrap();
        assert!(responder.greetings.contains(&reply.as_str()));
    }

    #[test]
    fn test_plain_mentions_get_a_remark() {
        let mut responder = SmallTalk::new();
        let reply = responder.respond("somebody", "@tmibot").unwrap();
        assert!(responder.remarks.contains(&reply.as_str()));
    }
}
