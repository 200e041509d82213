use anyhow::{Context, Result};
use std::time::Duration;

use crate::audio::player::PlayerSettings;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // registers commands on one guild while developing

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,

    // Timing
    pub idle_timeout: Duration,
    pub resolve_timeout: Duration,

    // Resolver
    pub ytdlp_path: String,
    pub max_concurrent_resolves: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_vars(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Builds the configuration from a variable lookup, falling back to the
    /// defaults for anything unset.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let or_default = |key: &str, default: String| var(key).unwrap_or(default);

        Ok(Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN is not set")?,
            application_id: var("APPLICATION_ID")
                .context("APPLICATION_ID is not set")?
                .parse()
                .context("APPLICATION_ID must be a number")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            // Audio
            default_volume: or_default("DEFAULT_VOLUME", defaults.default_volume.to_string())
                .parse()
                .context("DEFAULT_VOLUME must be a number")?,
            max_queue_size: or_default("MAX_QUEUE_SIZE", defaults.max_queue_size.to_string())
                .parse()
                .context("MAX_QUEUE_SIZE must be a number")?,
            max_playlist_size: or_default("MAX_PLAYLIST_SIZE", defaults.max_playlist_size.to_string())
                .parse()
                .context("MAX_PLAYLIST_SIZE must be a number")?,

            // Timing (humantime, e.g. "3m" or "90s")
            idle_timeout: match var("IDLE_TIMEOUT") {
                Some(value) => humantime::parse_duration(&value).context("invalid IDLE_TIMEOUT")?,
                None => defaults.idle_timeout,
            },
            resolve_timeout: match var("RESOLVE_TIMEOUT") {
                Some(value) => {
                    humantime::parse_duration(&value).context("invalid RESOLVE_TIMEOUT")?
                }
                None => defaults.resolve_timeout,
            },

            // Resolver
            ytdlp_path: or_default("YTDLP_PATH", defaults.ytdlp_path),
            max_concurrent_resolves: or_default(
                "MAX_CONCURRENT_RESOLVES",
                defaults.max_concurrent_resolves.to_string(),
            )
            .parse()
            .context("MAX_CONCURRENT_RESOLVES must be a number")?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token must not be empty
    /// - Volume must be between 0.0 and 1.0
    /// - Queue, playlist and concurrency limits must be > 0
    /// - Timeouts must be non-zero
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN must not be empty");
        }

        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 1.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.max_concurrent_resolves == 0 {
            anyhow::bail!("Max concurrent resolves must be greater than 0");
        }

        if self.idle_timeout.is_zero() || self.resolve_timeout.is_zero() {
            anyhow::bail!("Timeouts must be greater than zero");
        }

        Ok(())
    }

    pub fn player_settings(&self) -> PlayerSettings {
        PlayerSettings {
            idle_timeout: self.idle_timeout,
            default_volume: self.default_volume,
            resolve_timeout: self.resolve_timeout,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {} queue, {} per playlist\n  \
            Timing: idle {}, resolve {}\n  \
            Resolver: {} ({} concurrent)",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0).round() as u32,
            self.max_queue_size,
            self.max_playlist_size,
            humantime::format_duration(self.idle_timeout),
            humantime::format_duration(self.resolve_timeout),
            self.ytdlp_path,
            self.max_concurrent_resolves,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            max_queue_size: 1000,
            max_playlist_size: 100,

            idle_timeout: Duration::from_secs(180),
            resolve_timeout: Duration::from_secs(30),

            ytdlp_path: "yt-dlp".to_string(),
            max_concurrent_resolves: 3,
        }
    }
}
