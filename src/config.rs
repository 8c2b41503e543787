//! Startup configuration.
//!
//! Read once from a JSON file. A missing or malformed required key is a
//! startup fault: the process reports it and does not come up.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

fn default_prefix() -> String {
    ">>".to_string()
}

fn default_pleb_cooldown() -> u64 {
    10
}

fn default_raid_threshold() -> u64 {
    10
}

fn default_send_cooldown() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Minimum spacing between two outgoing messages to one channel.
    #[serde(default = "default_send_cooldown")]
    pub send_cooldown_secs: u64,
    pub bots: Vec<BotConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub channel: String,
    /// Logins with admin permissions for this channel.
    pub owners: Vec<String>,
    /// Command roster, in dispatch order. Every name must be known to the
    /// handler registry.
    pub commands: Vec<String>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Window during which ordinary viewers cannot re-trigger commands.
    #[serde(default = "default_pleb_cooldown")]
    pub pleb_cooldown_secs: u64,
    /// Raids below this viewer count are not announced.
    #[serde(default = "default_raid_threshold")]
    pub raid_announce_threshold: u64,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config.normalized())
    }

    /// Channel names and logins come out lowercased with no leading '#',
    /// matching the forms twitch uses on the wire.
    fn normalized(mut self) -> Config {
        for bot in &mut self.bots {
            bot.channel = bot.channel.trim_start_matches('#').to_lowercase();
            for owner in &mut bot.owners {
                *owner = owner.to_lowercase();
            }
        }
        self
    }

    pub fn channels(&self) -> Vec<String> {
        self.bots.iter().map(|b| b.channel.clone()).collect()
    }
}
