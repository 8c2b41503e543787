use bot::prelude::*;

pub struct Help;

#[async_trait]
impl CommandHandler for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    fn help(&self) -> String {
        "help -- lists commands // help <command> -- describes command".to_string()
    }

    fn matches(&self, line: &ChatLine<'_>, ctx: &BotContext) -> Result<bool, HandlerError> {
        Ok(line
            .command(&ctx.prefix)
            .map(|rest| rest.split_whitespace().next() == Some("help"))
            .unwrap_or(false))
    }

    async fn run(&mut self, line: &ChatLine<'_>, ctx: &mut BotContext) -> Result<(), HandlerError> {
        let rest = line.command(&ctx.prefix).unwrap_or("");

        let reply = match rest.split_whitespace().nth(1) {
            None => format!("commands: {}", {
                let mut names: Vec<&str> = ctx.roster_help.iter().map(|(name, _)| name.as_str()).collect();
                names.sort_unstable();
                names.join(", ")
            }),
            Some(name) => match ctx.roster_help.iter().find(|(n, _)| n.as_str() == name) {
                Some((_, help)) => format!("help: {}", help),
                None => format!("help: no such command: '{}'", name),
            },
        };

        ctx.writer.say(reply).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil;

    use async_std::task;

    fn roster(ctx: &mut BotContext) {
        ctx.roster_help = vec![
            ("help".to_string(), Help.help()),
            ("guess".to_string(), "guess -- start a round".to_string()),
        ];
    }

    #[test]
    fn test_lists_commands_sorted() {
        let (mut ctx, mut rx) = testutil::context("chan");
        roster(&mut ctx);
        let mut handler = Help;
        let fact = ChatFact::default();

        let line = ChatLine {
            user: "viewer",
            text: ">>help",
            fact: &fact,
        };
        assert!(handler.matches(&line, &ctx).unwrap());
        task::block_on(handler.run(&line, &mut ctx)).unwrap();

        let sent = testutil::sent(&mut rx);
        assert_eq!(sent, vec!["commands: guess, help".to_string()]);
    }

    #[test]
    fn test_describes_one_command() {
        let (mut ctx, mut rx) = testutil::context("chan");
        roster(&mut ctx);
        let mut handler = Help;
        let fact = ChatFact::default();

        let line = ChatLine {
            user: "viewer",
            text: ">>help guess",
            fact: &fact,
        };
        task::block_on(handler.run(&line, &mut ctx)).unwrap();

        let sent = testutil::sent(&mut rx);
        assert_eq!(sent, vec!["help: guess -- start a round".to_string()]);
    }

    #[test]
    fn test_unknown_command_says_so() {
        let (mut ctx, mut rx) = testutil::context("chan");
        roster(&mut ctx);
        let mut handler = Help;
        let fact = ChatFact::default();

        let line = ChatLine {
            user: "viewer",
            text: ">>help nope",
            fact: &fact,
        };
        task::block_on(handler.run(&line, &mut ctx)).unwrap();

        let sent = testutil::sent(&mut rx);
        assert_eq!(sent, vec!["help: no such command: 'nope'".to_string()]);
    }
}
