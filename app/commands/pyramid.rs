use std::collections::BTreeSet;

use bot::prelude::*;

const PLEB_PYRAMID_TIMEOUT_SECS: u64 = 30;
const POINTS_PER_LEVEL: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Ascending,
    Descending,
}

/// Watches every line for chat pyramids: the same single token repeated
/// 1, 2, ..., N, ..., 2, 1 times across consecutive messages.
///
/// A two-high pyramid gets its builders a short vacation, a real one pays
/// out points per level. Any line that breaks the count pattern resets the
/// state, so interleaved chatter kills a pyramid in progress.
pub struct Pyramid {
    phase: Phase,
    token: String,
    level: usize,
    peak: usize,
    builders: BTreeSet<String>,
}

/// The (token, count) of a line consisting of one token repeated, if it is.
/// Token equality is exact: "kappa kappax" is not two of "kappa".
fn uniform_token(text: &str) -> Option<(&str, usize)> {
    let mut tokens = text.split_whitespace();
    let first = tokens.next()?;
    let mut count = 1;
    for token in tokens {
        if token != first {
            return None;
        }
        count += 1;
    }
    Some((first, count))
}

impl Pyramid {
    pub fn new() -> Pyramid {
        Pyramid {
            phase: Phase::Idle,
            token: String::new(),
            level: 0,
            peak: 0,
            builders: BTreeSet::new(),
        }
    }

    fn start(&mut self, token: &str, user: &str) {
        self.phase = Phase::Ascending;
        self.token = token.to_string();
        self.level = 1;
        self.peak = 1;
        self.builders.clear();
        self.builders.insert(user.to_string());
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.token.clear();
        self.level = 0;
        self.peak = 0;
        self.builders.clear();
    }

    /// A line that does not continue the pattern. A lone token begins a new
    /// pyramid on the spot, anything else drops back to idle.
    fn mismatch(&mut self, token: &str, count: usize, user: &str) {
        if count == 1 {
            self.start(token, user);
        } else {
            self.reset();
        }
    }

    /// Feeds one line into the state machine. Returns the completed pyramid's
    /// peak and builders when this line finishes one.
    fn advance(&mut self, token: &str, count: usize, user: &str) -> Option<(usize, BTreeSet<String>)> {
        match self.phase {
            Phase::Idle => {
                if count == 1 {
                    self.start(token, user);
                }
                None
            }
            Phase::Ascending => {
                if token != self.token {
                    self.mismatch(token, count, user);
                    return None;
                }
                if count == self.level + 1 {
                    self.level = count;
                    self.peak = count;
                    self.builders.insert(user.to_string());
                    None
                } else if self.level >= 2 && count == self.level - 1 {
                    self.phase = Phase::Descending;
                    self.step_down(count, user)
                } else {
                    self.mismatch(token, count, user);
                    None
                }
            }
            Phase::Descending => {
                if token == self.token && count == self.level - 1 {
                    self.step_down(count, user)
                } else {
                    self.mismatch(token, count, user);
                    None
                }
            }
        }
    }

    fn step_down(&mut self, count: usize, user: &str) -> Option<(usize, BTreeSet<String>)> {
        self.level = count;
        self.builders.insert(user.to_string());
        if count == 1 {
            let peak = self.peak;
            let builders = std::mem::take(&mut self.builders);
            self.reset();
            Some((peak, builders))
        } else {
            None
        }
    }
}

#[async_trait]
impl CommandHandler for Pyramid {
    fn name(&self) -> &'static str {
        "pyramid"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Passive
    }

    fn help(&self) -> String {
        "watches chat for pyramids; small ones are punished, tall ones pay out".to_string()
    }

    fn matches(&self, _line: &ChatLine<'_>, _ctx: &BotContext) -> Result<bool, HandlerError> {
        Ok(true)
    }

    async fn run(&mut self, line: &ChatLine<'_>, ctx: &mut BotContext) -> Result<(), HandlerError> {
        let (token, count) = match uniform_token(line.text) {
            Some(parsed) => parsed,
            None => {
                if self.phase != Phase::Idle {
                    self.reset();
                }
                return Ok(());
            }
        };

        let completed = self.advance(token, count, line.user);
        if let Some((peak, builders)) = completed {
            info!(
                "[{}] {}-high pyramid by {:?}",
                ctx.channel, peak, builders
            );
            if peak == 2 {
                for builder in &builders {
                    if !ctx.is_privileged(builder) {
                        ctx.writer.timeout(builder, PLEB_PYRAMID_TIMEOUT_SECS).await;
                    }
                }
            } else {
                let amount = POINTS_PER_LEVEL * peak as i64;
                for builder in &builders {
                    let amount = if ctx.is_privileged(builder) { amount / 10 } else { amount };
                    ctx.points.add(builder, amount);
                }
                if let Err(e) = ctx.points.flush() {
                    error!("[{}] failed to persist pyramid payout: {}", ctx.channel, e);
                }
                ctx.writer
                    .say(format!("{}-high pyramid, {} builder(s) paid out", peak, builders.len()))
                    .await;
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

    async fn feed(handler: &mut Pyramid, ctx: &mut BotContext, user: &str, text: &str) {
        let fact = ChatFact::default();
        let line = ChatLine { user, text, fact: &fact };
        handler.run(&line, ctx).await.unwrap();
    }

    #[test]
    fn test_uniform_token() {
        assert_eq!(uniform_token("kappa"), Some(("kappa", 1)));
        assert_eq!(uniform_token("kappa kappa kappa"), Some(("kappa", 3)));
        assert_eq!(uniform_token("kappa kappax"), None);
        assert_eq!(uniform_token("   "), None);
    }

    #[test]
    fn test_two_level_pyramid_times_out_builder() {
        let (mut ctx, mut rx) = testutil::context("chan");
        let mut handler = Pyramid::new();

        task::block_on(async {
            feed(&mut handler, &mut ctx, "pleb", "kappa").await;
            feed(&mut handler, &mut ctx, "pleb", "kappa kappa").await;
            feed(&mut handler, &mut ctx, "pleb", "kappa").await;
        });

        let sent = testutil::sent(&mut rx);
        assert_eq!(sent, vec![format!("/timeout pleb {}", PLEB_PYRAMID_TIMEOUT_SECS)]);
    }

    #[test]
    fn test_privileged_builder_is_not_timed_out() {
        let (mut ctx, mut rx) = testutil::context("chan");
        ctx.presence.set_mod("somemod", true);
        let mut handler = Pyramid::new();

        task::block_on(async {
            feed(&mut handler, &mut ctx, "somemod", "kappa").await;
            feed(&mut handler, &mut ctx, "somemod", "kappa kappa").await;
            feed(&mut handler, &mut ctx, "somemod", "kappa").await;
        });

        assert!(testutil::sent(&mut rx).is_empty());
    }

    #[test]
    fn test_tall_pyramid_pays_tiered_points() {
        let (mut ctx, mut rx) = testutil::context("chan");
        ctx.presence.set_mod("somemod", true);
        let mut handler = Pyramid::new();

        task::block_on(async {
            feed(&mut handler, &mut ctx, "pleb", "pog").await;
            feed(&mut handler, &mut ctx, "pleb", "pog pog").await;
            feed(&mut handler, &mut ctx, "somemod", "pog pog pog").await;
            feed(&mut handler, &mut ctx, "pleb", "pog pog").await;
            feed(&mut handler, &mut ctx, "pleb", "pog").await;
        });

        assert_eq!(ctx.points.get("pleb"), 30);
        assert_eq!(ctx.points.get("somemod"), 3);

        let sent = testutil::sent(&mut rx);
        assert_eq!(sent, vec!["3-high pyramid, 2 builder(s) paid out".to_string()]);
    }

    #[test]
    fn test_substring_token_does_not_continue() {
        let (mut ctx, mut rx) = testutil::context("chan");
        let mut handler = Pyramid::new();

        task::block_on(async {
            feed(&mut handler, &mut ctx, "pleb", "kappa").await;
            feed(&mut handler, &mut ctx, "pleb", "kappa kappax").await;
            feed(&mut handler, &mut ctx, "pleb", "kappa").await;
        });

        // the broken line dropped the state to idle, so no pyramid completed
        assert!(testutil::sent(&mut rx).is_empty());
        assert_eq!(handler.phase, Phase::Ascending);
        assert_eq!(handler.level, 1);
    }

    #[test]
    fn test_interleaved_chatter_resets() {
        let (mut ctx, mut rx) = testutil::context("chan");
        let mut handler = Pyramid::new();

        task::block_on(async {
            feed(&mut handler, &mut ctx, "pleb", "pog").await;
            feed(&mut handler, &mut ctx, "pleb", "pog pog").await;
            feed(&mut handler, &mut ctx, "other", "what is going on here").await;
            feed(&mut handler, &mut ctx, "pleb", "pog").await;
        });

        assert!(testutil::sent(&mut rx).is_empty());
    }

    #[test]
    fn test_mismatched_count_with_single_token_restarts() {
        let (mut ctx, _rx) = testutil::context("chan");
        let mut handler = Pyramid::new();

        task::block_on(async {
            feed(&mut handler, &mut ctx, "pleb", "pog").await;
            feed(&mut handler, &mut ctx, "pleb", "pog pog").await;
            feed(&mut handler, &mut ctx, "pleb", "lul").await;
        });

        assert_eq!(handler.phase, Phase::Ascending);
        assert_eq!(handler.token, "lul");
        assert_eq!(handler.level, 1);
    }
}
