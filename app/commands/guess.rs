use bot::prelude::*;

use rand::Rng;

const CLUE_INTERVAL: Duration = Duration::from_secs(30);
const WINNER_REWARD: i64 = 25;

/// A named closure rendering one kind of hint about the secret number.
pub type HintProvider = (&'static str, Box<dyn Fn(u32) -> String + Send + Sync>);

pub fn standard_hints() -> Vec<HintProvider> {
    vec![
        (
            "parity",
            Box::new(|n: u32| format!("the number is {}", if n % 2 == 0 { "even" } else { "odd" })),
        ),
        (
            "half",
            Box::new(|n: u32| format!("the number is {} 50", if n > 50 { "above" } else { "at most" })),
        ),
        (
            "last-digit",
            Box::new(|n: u32| format!("the number ends in {}", n % 10)),
        ),
    ]
}

struct Round {
    answer: u32,
    timer: TimerHandle,
    guesses: u64,
}

/// Number guessing game with a clue drip.
///
/// One round at a time; while a round runs, any bare number in chat counts
/// as a guess. Hints rotate through the providers on a timer until somebody
/// wins or a moderator stops the round.
pub struct Guess {
    hints: Vec<HintProvider>,
    next_hint: usize,
    round: Option<Round>,
}

impl Guess {
    pub fn new(hints: Vec<HintProvider>) -> Guess {
        Guess {
            hints,
            next_hint: 0,
            round: None,
        }
    }

    async fn start(&mut self, line: &ChatLine<'_>, ctx: &mut BotContext) {
        if self.round.is_some() {
            ctx.writer.say("the game is already on, send your number").await;
            return;
        }
        if ctx.game_running {
            debug!("[{}] another game is running, not starting", ctx.channel);
            return;
        }
        ctx.game_running = true;

        let answer = rand::thread_rng().gen_range(1..=100);
        let timer = ctx.timers.schedule(&ctx.channel, self.name(), CLUE_INTERVAL);
        self.round = Some(Round {
            answer,
            timer,
            guesses: 0,
        });
        self.next_hint = 0;

        debug!("[{}] guess round started by {}, answer is {}", ctx.channel, line.user, answer);
        ctx.writer
            .say("I picked a number between 1 and 100, first to name it wins")
            .await;
    }

    async fn stop(&mut self, line: &ChatLine<'_>, ctx: &mut BotContext) {
        if !ctx.is_privileged(line.user) {
            debug!("[{}] {} may not stop the game", ctx.channel, line.user);
            return;
        }
        match self.round.take() {
            Some(round) => {
                round.timer.cancel();
                ctx.game_running = false;
                ctx.writer
                    .say(format!("round over, the number was {}", round.answer))
                    .await;
            }
            None => ctx.writer.say("no round running").await,
        }
    }

    async fn try_guess(&mut self, line: &ChatLine<'_>, ctx: &mut BotContext) -> Result<(), HandlerError> {
        let answer = match &mut self.round {
            Some(round) => {
                round.guesses += 1;
                round.answer
            }
            None => return Ok(()),
        };

        let guess: u32 = match line.text.trim().parse() {
            Ok(guess) => guess,
            Err(_) => return Ok(()),
        };
        if guess != answer {
            return Ok(());
        }

        let round = self.round.take().expect("round was checked above");
        round.timer.cancel();
        ctx.game_running = false;

        ctx.points.award(line.user, WINNER_REWARD)?;
        ctx.writer
            .say(format!(
                "{} got it in {} guess(es), the number was {}",
                line.user, round.guesses, answer
            ))
            .await;
        Ok(())
    }
}

#[async_trait]
impl CommandHandler for Guess {
    fn name(&self) -> &'static str {
        "guess"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Game
    }

    fn help(&self) -> String {
        "guess -- start a number guessing round // guess stop -- end it early (mods)".to_string()
    }

    fn matches(&self, line: &ChatLine<'_>, ctx: &BotContext) -> Result<bool, HandlerError> {
        if let Some(rest) = line.command(&ctx.prefix) {
            return Ok(rest.split_whitespace().next() == Some("guess"));
        }
        Ok(self.round.is_some() && line.text.trim().parse::<u32>().is_ok())
    }

    async fn run(&mut self, line: &ChatLine<'_>, ctx: &mut BotContext) -> Result<(), HandlerError> {
        if let Some(rest) = line.command(&ctx.prefix) {
            match rest.split_whitespace().nth(1) {
                None => self.start(line, ctx).await,
                Some("stop") => self.stop(line, ctx).await,
                _ => {
                    let help = self.help();
                    ctx.writer.say(help).await;
                }
            }
            return Ok(());
        }
        self.try_guess(line, ctx).await
    }

    async fn tick(&mut self, ctx: &mut BotContext) -> Result<(), HandlerError> {
        let answer = match &self.round {
            Some(round) => round.answer,
            None => return Ok(()),
        };
        if self.hints.is_empty() {
            return Ok(());
        }

        let index = self.next_hint % self.hints.len();
        let hint = {
            let (name, render) = &self.hints[index];
            debug!("[{}] dripping '{}' hint", ctx.channel, name);
            render(answer)
        };
        self.next_hint += 1;

        ctx.writer.say(format!("hint: {}", hint)).await;
        Ok(())
    }

    fn close(&mut self, ctx: &mut BotContext) -> Result<(), HandlerError> {
        if let Some(round) = self.round.take() {
            round.timer.cancel();
            ctx.game_running = false;
        }
        Ok(())
    }
}
