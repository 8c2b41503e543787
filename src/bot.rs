use log::*;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use futures::channel::mpsc::Sender;
use futures::SinkExt;

use crate::config::BotConfig;
use crate::cooldown::{CooldownData, CooldownState, CooldownTracker};
use crate::error::{ConfigError, HandlerError};
use crate::model::PreparedMessage;
use crate::permissions::{PermissionLevel, PermissionList};
use crate::speech::{SpeechRequest, SpeechSender};
use crate::storage::{self, PointsLedger, Store};
use crate::timer::TimerService;
use crate::tmi::{ChatFact, UserNotice};

/// A permission warning for one handler is voiced at most once per window.
const WARN_WINDOW: Duration = Duration::from_secs(60);

/// How a handler takes part in dispatch.
///
/// `Standard` handlers answer explicit commands. `Game` handlers are like
/// standard ones but participate in the running-game protocol. `Passive`
/// handlers see every line and never count as command usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Standard,
    Game,
    Passive,
}

/// One PRIVMSG as handlers see it.
pub struct ChatLine<'a> {
    /// Sender's login, lowercase.
    pub user: &'a str,
    pub text: &'a str,
    pub fact: &'a ChatFact,
}

impl<'a> ChatLine<'a> {
    /// Text after the command prefix, None if the line is not prefixed.
    pub fn command(&self, prefix: &str) -> Option<&'a str> {
        if self.text.starts_with(prefix) {
            Some(self.text[prefix.len()..].trim_start())
        } else {
            None
        }
    }
}

/// Write capability handed to handlers. Everything goes through the outgoing
/// funnel, so messages produced here are rate-limited and deduplicated like
/// any other.
#[derive(Clone)]
pub struct Writer {
    channel: String,
    tx_message: Sender<PreparedMessage>,
}

impl Writer {
    pub fn new(channel: impl Into<String>, tx_message: Sender<PreparedMessage>) -> Writer {
        Writer {
            channel: channel.into(),
            tx_message,
        }
    }

    pub async fn say(&mut self, message: impl Into<String>) {
        let message = PreparedMessage {
            channel: self.channel.clone(),
            message: message.into(),
        };
        if let Err(e) = self.tx_message.send(message).await {
            error!("Failed to submit message to message queue: {}", e);
        }
    }

    pub async fn timeout(&mut self, user: &str, seconds: u64) {
        info!("[{}] moderation: timeout {} for {}s", self.channel, user, seconds);
        self.say(format!("/timeout {} {}", user, seconds)).await;
    }

    pub async fn ban(&mut self, user: &str) {
        info!("[{}] moderation: ban {}", self.channel, user);
        self.say(format!("/ban {}", user)).await;
    }

    pub async fn unban(&mut self, user: &str) {
        info!("[{}] moderation: unban {}", self.channel, user);
        self.say(format!("/unban {}", user)).await;
    }

    pub async fn whisper(&mut self, user: &str, message: &str) {
        self.say(format!("/w {} {}", user, message)).await;
    }
}

/// Who is in the channel and what twitch has told us about them. Observation
/// only adds facts; users leave the sets through explicit events (PART,
/// MODE -o), never by staying quiet.
#[derive(Debug, Default)]
pub struct Presence {
    pub users: BTreeSet<String>,
    pub mods: BTreeSet<String>,
    pub subs: BTreeSet<String>,
    /// When each user last said something.
    pub activity: HashMap<String, Instant>,
}

impl Presence {
    pub fn join(&mut self, user: &str) {
        self.users.insert(user.to_string());
    }

    pub fn part(&mut self, user: &str) {
        self.users.remove(user);
        self.activity.remove(user);
    }

    pub fn set_mod(&mut self, user: &str, is_mod: bool) {
        if is_mod {
            self.mods.insert(user.to_string());
        } else {
            self.mods.remove(user);
        }
    }

    pub fn observe(&mut self, user: &str, fact: &ChatFact) {
        self.users.insert(user.to_string());
        self.activity.insert(user.to_string(), Instant::now());
        if fact.is_mod || fact.is_broadcaster {
            self.mods.insert(user.to_string());
        }
        if fact.is_sub {
            self.subs.insert(user.to_string());
        }
    }

    /// How many users said something within the last `window`.
    pub fn active_within(&self, window: Duration) -> usize {
        let now = Instant::now();
        self.activity
            .values()
            .filter(|stamp| now.duration_since(**stamp) <= window)
            .count()
    }
}

/// An instruction a handler leaves for its own dispatcher. Applied after the
/// dispatch pass completes, so the handler list is never modified while it is
/// being iterated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlRequest {
    Pause,
    Resume,
    Reload,
}

/// Per-channel state and capabilities shared by all handlers of one bot.
pub struct BotContext {
    pub channel: String,
    pub username: String,
    pub prefix: String,
    pub writer: Writer,
    pub timers: TimerService,
    pub presence: Presence,
    pub points: PointsLedger,
    pub paused: bool,
    /// At most one game runs per channel. A game handler takes the flag when
    /// it starts and must give it back when the game ends.
    pub game_running: bool,
    /// A handler that answered conversationally sets this to keep the speech
    /// worker from also replying to the same line. Cleared after every pass.
    pub suppress_speech: bool,
    pub control: Option<ControlRequest>,
    /// (name, help) of the current roster, for the help command.
    pub roster_help: Vec<(String, String)>,
    /// Whether twitch granted the bot itself moderator state here.
    pub bot_is_mod: bool,
    username_with_at: String,
    grants: PermissionList,
    trusted_mods: BTreeSet<String>,
    ignored: BTreeSet<String>,
}

impl BotContext {
    pub fn new(
        channel: &str,
        username: &str,
        prefix: &str,
        writer: Writer,
        timers: TimerService,
        points: PointsLedger,
    ) -> BotContext {
        BotContext {
            channel: channel.to_string(),
            username: username.to_string(),
            username_with_at: format!("@{}", username.to_lowercase()),
            prefix: prefix.to_string(),
            writer,
            timers,
            presence: Presence::default(),
            points,
            paused: false,
            game_running: false,
            suppress_speech: false,
            control: None,
            roster_help: Vec::new(),
            bot_is_mod: false,
            grants: PermissionList::new(HashMap::new()),
            trusted_mods: BTreeSet::new(),
            ignored: BTreeSet::new(),
        }
    }

    /// Resolves a user's permission level from owner grants and what has
    /// been observed about them so far.
    pub fn level_of(&self, user: &str) -> PermissionLevel {
        if self.grants.get(user).permits(PermissionLevel::Admin) {
            PermissionLevel::Admin
        } else if self.trusted_mods.contains(user) || self.presence.mods.contains(user) {
            PermissionLevel::Moderator
        } else if self.presence.subs.contains(user) {
            PermissionLevel::Subscriber
        } else {
            PermissionLevel::User
        }
    }

    pub fn is_privileged(&self, user: &str) -> bool {
        self.level_of(user).permits(PermissionLevel::Moderator)
    }
}

/// A command handler: the unit of bot behavior.
///
/// Handlers live in a per-channel roster and are driven exclusively by the
/// dispatch loop, one call at a time, so implementations keep plain mutable
/// state. A handler wanting periodic work schedules a timer through
/// `ctx.timers` under its own name and receives `tick` calls; it must cancel
/// the timer in `close`.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Name the handler is registered and addressed under.
    fn name(&self) -> &'static str;

    /// Minimum permission level required to trigger this handler.
    fn level(&self) -> PermissionLevel {
        PermissionLevel::User
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Standard
    }

    fn help(&self) -> String;

    /// Cheap predicate deciding whether `run` wants this line.
    fn matches(&self, line: &ChatLine<'_>, ctx: &BotContext) -> Result<bool, HandlerError>;

    async fn run(&mut self, line: &ChatLine<'_>, ctx: &mut BotContext) -> Result<(), HandlerError>;

    /// Periodic callback for timers scheduled under this handler's name.
    async fn tick(&mut self, ctx: &mut BotContext) -> Result<(), HandlerError> {
        let _ = ctx;
        Ok(())
    }

    /// Called when the handler is discarded, e.g. on roster reload.
    fn close(&mut self, ctx: &mut BotContext) -> Result<(), HandlerError> {
        let _ = ctx;
        Ok(())
    }
}

/// Everything a handler constructor may draw from. Handlers that persist
/// state keep their own clone of the store.
pub struct HandlerSeed<'a> {
    pub channel: &'a str,
    pub config: &'a BotConfig,
    pub store: &'a Arc<dyn Store>,
}

pub type HandlerCtor = Box<dyn Fn(&HandlerSeed<'_>) -> Result<Box<dyn CommandHandler>, HandlerError> + Send + Sync>;

/// Named handler constructors. The config roster refers to handlers by these
/// names; reloading a bot builds fresh instances from the same constructors.
#[derive(Default)]
pub struct HandlerRegistry {
    ctors: HashMap<String, HandlerCtor>,
}

impl HandlerRegistry {
    pub fn new() -> HandlerRegistry {
        HandlerRegistry::default()
    }

    pub fn register<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn(&HandlerSeed<'_>) -> Result<Box<dyn CommandHandler>, HandlerError> + Send + Sync + 'static,
    {
        self.ctors.insert(name.to_string(), Box::new(ctor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }

    fn construct(&self, name: &str, seed: &HandlerSeed<'_>) -> Option<Result<Box<dyn CommandHandler>, HandlerError>> {
        self.ctors.get(name).map(|ctor| ctor(seed))
    }
}

const TRUSTED_MODS_DOC: &str = "trusted_mods";
const IGNORED_USERS_DOC: &str = "ignored_users";

/// One bot instance: the channel roster plus everything dispatch needs.
pub struct Bot {
    config: BotConfig,
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn Store>,
    handlers: Vec<Box<dyn CommandHandler>>,
    /// Window armed whenever an ordinary viewer successfully uses a standard
    /// command. While armed, ordinary viewers only reach passive handlers and
    /// a running game.
    pleb_gate: CooldownData,
    warn_gates: CooldownTracker<String>,
    speech: Option<SpeechSender>,
    ctx: BotContext,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn Store>,
        writer: Writer,
        timers: TimerService,
        username: &str,
        speech: Option<SpeechSender>,
    ) -> Result<Bot, ConfigError> {
        let handlers = Self::build_handlers(&registry, &config, &store)?;

        let points = PointsLedger::load(store.clone(), &config.channel)?;
        let mut ctx = BotContext::new(&config.channel, username, &config.prefix, writer, timers, points);

        let mut grants = HashMap::new();
        for owner in &config.owners {
            grants.insert(owner.clone(), PermissionLevel::Admin);
        }
        ctx.grants = PermissionList::new(grants);
        ctx.trusted_mods = Self::load_list(store.as_ref(), TRUSTED_MODS_DOC)?;
        ctx.ignored = Self::load_list(store.as_ref(), IGNORED_USERS_DOC)?;
        ctx.roster_help = handlers.iter().map(|h| (h.name().to_string(), h.help())).collect();

        let pleb_gate = CooldownData::new(Duration::from_secs(config.pleb_cooldown_secs), true);

        Ok(Bot {
            config,
            registry,
            store,
            handlers,
            pleb_gate,
            warn_gates: CooldownTracker::new(HashMap::new()),
            speech,
            ctx,
        })
    }

    /// Builds the full roster or fails. Used at startup, where an unknown
    /// name or a failing constructor must abort the whole process.
    fn build_handlers(
        registry: &HandlerRegistry,
        config: &BotConfig,
        store: &Arc<dyn Store>,
    ) -> Result<Vec<Box<dyn CommandHandler>>, ConfigError> {
        let seed = HandlerSeed {
            channel: &config.channel,
            config,
            store,
        };
        let mut handlers = Vec::with_capacity(config.commands.len());
        for name in &config.commands {
            match registry.construct(name, &seed) {
                Some(Ok(handler)) => handlers.push(handler),
                Some(Err(source)) => {
                    return Err(ConfigError::CommandInit {
                        name: name.clone(),
                        source,
                    })
                }
                None => {
                    return Err(ConfigError::UnknownCommand {
                        name: name.clone(),
                        channel: config.channel.clone(),
                    })
                }
            }
        }
        Ok(handlers)
    }

    fn load_list(store: &dyn Store, doc: &str) -> Result<BTreeSet<String>, ConfigError> {
        Ok(storage::load_as::<Vec<String>>(store, doc)?
            .unwrap_or_default()
            .into_iter()
            .collect())
    }

    pub fn channel(&self) -> &str {
        &self.ctx.channel
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    /// Runs the dispatch pass for one chat line.
    ///
    /// The pass is strictly ordered: ignore list, bookkeeping, pause gate,
    /// permission resolution, pleb-window candidate restriction, then every
    /// handler in roster order. A failing handler is logged and skipped, it
    /// never stops the pass.
    pub async fn process_line(&mut self, user: &str, text: &str, fact: &ChatFact) {
        if self.ctx.ignored.contains(user) {
            debug!("[{}] dropping message from ignored user {}", self.ctx.channel, user);
            return;
        }

        self.ctx.presence.observe(user, fact);
        self.ctx.points.add(user, 1);

        let level = self.ctx.level_of(user);

        if self.ctx.paused && !level.permits(PermissionLevel::Admin) && !self.ctx.trusted_mods.contains(user) {
            return;
        }

        let line = ChatLine { user, text, fact };
        let restricted = level == PermissionLevel::User && self.pleb_gate.is_cooldown();
        let mut ran_standard = false;

        for handler in self.handlers.iter_mut() {
            if restricted && !allowed_while_restricted(handler.kind(), self.ctx.game_running) {
                continue;
            }

            let matched = match handler.matches(&line, &self.ctx) {
                Ok(matched) => matched,
                Err(e) => {
                    error!("[{}] '{}' match check failed: {}", self.ctx.channel, handler.name(), e);
                    false
                }
            };
            if !matched {
                continue;
            }

            if !level.permits(handler.level()) {
                warn_about_permissions(&self.warn_gates, &mut self.ctx, user, handler.as_ref()).await;
                continue;
            }

            if let Err(e) = handler.run(&line, &mut self.ctx).await {
                error!("[{}] '{}' failed: {}", self.ctx.channel, handler.name(), e);
            } else if handler.kind() == HandlerKind::Standard {
                ran_standard = true;
            }
        }

        if ran_standard && level == PermissionLevel::User {
            self.pleb_gate.touch();
        }

        self.maybe_request_speech(user, text);
        self.ctx.suppress_speech = false;

        if let Some(request) = self.ctx.control.take() {
            self.apply_control(request);
        }
    }

    fn maybe_request_speech(&mut self, user: &str, text: &str) {
        if self.ctx.suppress_speech {
            return;
        }
        let speech = match &self.speech {
            Some(speech) => speech,
            None => return,
        };
        if !text.to_lowercase().contains(&self.ctx.username_with_at) {
            return;
        }
        let request = SpeechRequest {
            channel: self.ctx.channel.clone(),
            user: user.to_string(),
            text: text.to_string(),
        };
        if let Err(e) = speech.send(request) {
            warn!("[{}] speech worker is gone: {}", self.ctx.channel, e);
        }
    }

    /// Delivers a timer tick to the named handler.
    pub async fn on_tick(&mut self, handler_name: &str) {
        for handler in self.handlers.iter_mut() {
            if handler.name() == handler_name {
                if let Err(e) = handler.tick(&mut self.ctx).await {
                    error!("[{}] '{}' tick failed: {}", self.ctx.channel, handler_name, e);
                }
            }
        }
    }

    pub async fn on_usernotice(&mut self, notice: UserNotice, author: &str) {
        match notice {
            UserNotice::Raid { viewers } => {
                if viewers >= self.config.raid_announce_threshold {
                    self.ctx
                        .writer
                        .say(format!("{} is raiding with {} viewers, welcome!", author, viewers))
                        .await;
                } else {
                    debug!(
                        "[{}] not announcing raid by {} ({} viewers)",
                        self.ctx.channel, author, viewers
                    );
                }
            }
            UserNotice::Ritual => {
                debug!("[{}] ritual notice from {}", self.ctx.channel, author);
            }
            UserNotice::Sub => {
                self.ctx.writer.say(format!("{} just subscribed!", author)).await;
            }
            UserNotice::Resub { months } => {
                let message = match months {
                    Some(months) => format!("{} resubscribed for {} months in a row!", author, months),
                    None => format!("{} resubscribed!", author),
                };
                self.ctx.writer.say(message).await;
            }
            UserNotice::Unknown(kind) => {
                debug!("[{}] unhandled usernotice '{}' from {}", self.ctx.channel, kind, author);
            }
        }
    }

    pub fn on_join(&mut self, user: &str) {
        self.ctx.presence.join(user);
    }

    pub fn on_part(&mut self, user: &str) {
        self.ctx.presence.part(user);
    }

    pub fn on_mode(&mut self, user: &str, is_mod: bool) {
        self.ctx.presence.set_mod(user, is_mod);
    }

    pub fn on_userstate(&mut self, fact: &ChatFact) {
        if fact.is_mod != self.ctx.bot_is_mod {
            info!(
                "[{}] bot {} moderator state",
                self.ctx.channel,
                if fact.is_mod { "gained" } else { "lost" }
            );
        }
        self.ctx.bot_is_mod = fact.is_mod;
    }

    pub fn on_clearchat(&mut self, target: Option<&str>) {
        match target {
            Some(user) => info!("[{}] chat cleared for {}", self.ctx.channel, user),
            None => info!("[{}] chat cleared", self.ctx.channel),
        }
    }

    /// Stops reacting to anything but admins and trusted mods.
    pub fn pause(&mut self) {
        info!("[{}] paused", self.ctx.channel);
        self.ctx.paused = true;
    }

    pub fn resume(&mut self) {
        info!("[{}] resumed", self.ctx.channel);
        self.ctx.paused = false;
    }

    fn apply_control(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::Pause => self.pause(),
            ControlRequest::Resume => self.resume(),
            ControlRequest::Reload => self.reload(),
        }
    }

    /// Closes every handler and rebuilds the roster from the registry.
    ///
    /// Runtime reload is forgiving: a name that no longer constructs is
    /// logged and skipped instead of taking the bot down. The trusted-mod
    /// and ignore lists are re-read from the store as well.
    pub fn reload(&mut self) {
        info!("[{}] reloading handlers", self.ctx.channel);

        if let Err(e) = self.ctx.points.flush() {
            error!("[{}] failed to flush points: {}", self.ctx.channel, e);
        }

        let mut old = std::mem::take(&mut self.handlers);
        for handler in old.iter_mut() {
            if let Err(e) = handler.close(&mut self.ctx) {
                error!("[{}] '{}' failed to close: {}", self.ctx.channel, handler.name(), e);
            }
        }

        let seed = HandlerSeed {
            channel: &self.config.channel,
            config: &self.config,
            store: &self.store,
        };
        let mut rebuilt = Vec::with_capacity(self.config.commands.len());
        for name in &self.config.commands {
            match self.registry.construct(name, &seed) {
                Some(Ok(handler)) => rebuilt.push(handler),
                Some(Err(e)) => error!("[{}] skipping command '{}': {}", self.config.channel, name, e),
                None => error!("[{}] skipping unknown command '{}'", self.config.channel, name),
            }
        }
        self.handlers = rebuilt;
        self.ctx.roster_help = self.handlers.iter().map(|h| (h.name().to_string(), h.help())).collect();

        match Self::load_list(self.store.as_ref(), TRUSTED_MODS_DOC) {
            Ok(list) => self.ctx.trusted_mods = list,
            Err(e) => error!("[{}] failed to re-read trusted mods: {}", self.config.channel, e),
        }
        match Self::load_list(self.store.as_ref(), IGNORED_USERS_DOC) {
            Ok(list) => self.ctx.ignored = list,
            Err(e) => error!("[{}] failed to re-read ignored users: {}", self.config.channel, e),
        }
    }
}

fn allowed_while_restricted(kind: HandlerKind, game_running: bool) -> bool {
    match kind {
        HandlerKind::Passive => true,
        HandlerKind::Game => game_running,
        HandlerKind::Standard => false,
    }
}

async fn warn_about_permissions(
    warn_gates: &CooldownTracker<String>,
    ctx: &mut BotContext,
    user: &str,
    handler: &dyn CommandHandler,
) {
    let name = handler.name().to_string();
    info!("[{}] user {} lacks permissions to execute '{}'", ctx.channel, user, name);

    if !warn_gates.contains(&name) {
        warn_gates.add_channel(name.clone(), WARN_WINDOW, true);
    }
    if let Some(CooldownState::Ready) = warn_gates.access(&name) {
        ctx.writer
            .say(format!(
                "@{}, '{}' needs {:?} permissions",
                user,
                name,
                handler.level()
            ))
            .await;
    }
}
