use bot::prelude::*;

/// Owner controls routed through the dispatch context: pausing, resuming,
/// roster reload, and a one-line status readout.
pub struct BotCtl;

#[async_trait]
impl CommandHandler for BotCtl {
    fn name(&self) -> &'static str {
        "botctl"
    }

    fn level(&self) -> PermissionLevel {
        PermissionLevel::Admin
    }

    fn help(&self) -> String {
        "bot pause|resume|reload -- owner controls // bot status -- state readout".to_string()
    }

    fn matches(&self, line: &ChatLine<'_>, ctx: &BotContext) -> Result<bool, HandlerError> {
        Ok(line
            .command(&ctx.prefix)
            .map(|rest| rest.split_whitespace().next() == Some("bot"))
            .unwrap_or(false))
    }

    async fn run(&mut self, line: &ChatLine<'_>, ctx: &mut BotContext) -> Result<(), HandlerError> {
        let rest = line.command(&ctx.prefix).unwrap_or("");
        match rest.split_whitespace().nth(1) {
            Some("pause") => {
                ctx.control = Some(ControlRequest::Pause);
                ctx.writer.say("pausing, privileged commands only").await;
            }
            Some("resume") => {
                ctx.control = Some(ControlRequest::Resume);
                ctx.writer.say("back at it").await;
            }
            Some("reload") => {
                ctx.control = Some(ControlRequest::Reload);
                ctx.writer.say("reloading command roster").await;
            }
            Some("status") => {
                let status = format!(
                    "channel: {} / paused: {} / game running: {} / commands: {} / users seen: {} / chatting in the last 5 min: {}",
                    ctx.channel,
                    ctx.paused,
                    ctx.game_running,
                    ctx.roster_help.len(),
                    ctx.presence.users.len(),
                    ctx.presence.active_within(Duration::from_secs(300)),
                );
                ctx.writer.say(status).await;
            }
            _ => {
                let help = self.help();
                ctx.writer.say(help).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testutil;

    use async_std::task;

    #[test]
    fn test_control_requests_are_left_for_the_dispatcher() {
        let (mut ctx, mut rx) = testutil::context("chan");
        let mut handler = BotCtl;
        let fact = ChatFact::default();

        for &(text, expected) in &[
            (">>bot pause", ControlRequest::Pause),
            (">>bot resume", ControlRequest::Resume),
            (">>bot reload", ControlRequest::Reload),
        ] {
            let line = ChatLine {
                user: "owner",
                text,
                fact: &fact,
            };
            assert!(handler.matches(&line, &ctx).unwrap());
            task::block_on(handler.run(&line, &mut ctx)).unwrap();
            assert_eq!(ctx.control.take(), Some(expected));
        }

        assert_eq!(testutil::sent(&mut rx).len(), 3);
    }

    #[test]
    fn test_status_reports_without_control_request() {
        let (mut ctx, mut rx) = testutil::context("chan");
        let mut handler = BotCtl;
        let fact = ChatFact::default();

        let line = ChatLine {
            user: "owner",
            text: ">>bot status",
            fact: &fact,
        };
        task::block_on(handler.run(&line, &mut ctx)).unwrap();

        assert_eq!(ctx.control, None);
        let sent = testutil::sent(&mut rx);
        assert!(sent[0].contains("channel: chan"));
        assert!(sent[0].contains("paused: false"));
    }

    #[test]
    fn test_requires_admin_level() {
        let handler = BotCtl;
        assert_eq!(handler.level(), PermissionLevel::Admin);
    }
}
