//! Application settings and Telegram configuration.

use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use super::DEFAULT_POINTS_STEP;

/// Telegram API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (obtain from <https://my.telegram.org>).
    pub api_id: i32,

    /// Telegram API hash (obtain from <https://my.telegram.org>).
    pub api_hash: String,

    /// Bot token issued by `@BotFather`.
    #[serde(skip_serializing)]
    pub bot_token: String,

    /// Username of the chat that carries the counter message.
    pub target_chat: String,

    /// Path to the session file.
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,
}

fn default_session_path() -> PathBuf {
    PathBuf::from("bot.session")
}

impl TelegramConfig {
    /// Creates configuration from environment variables.
    ///
    /// Expects `TG_API_ID`, `TG_API_HASH`, `BOT_TOKEN` and `TARGET_CHAT` to be set.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_id: i32 = std::env::var("TG_API_ID")
            .map_err(|_| ConfigError::MissingEnvVar("TG_API_ID"))?
            .parse()
            .map_err(|_| ConfigError::InvalidApiId)?;

        let api_hash = std::env::var("TG_API_HASH")
            .map_err(|_| ConfigError::MissingEnvVar("TG_API_HASH"))?;

        let bot_token =
            std::env::var("BOT_TOKEN").map_err(|_| ConfigError::MissingEnvVar("BOT_TOKEN"))?;

        let target_chat = std::env::var("TARGET_CHAT")
            .map_err(|_| ConfigError::MissingEnvVar("TARGET_CHAT"))
            .and_then(|chat| normalize_chat(&chat))?;

        let session_path = std::env::var("TG_SESSION_PATH")
            .map_or_else(|_| default_session_path(), PathBuf::from);

        Ok(Self {
            api_id,
            api_hash,
            bot_token,
            target_chat,
            session_path,
        })
    }
}

/// Strips a leading `@` and rejects empty chat usernames.
fn normalize_chat(chat: &str) -> Result<String, ConfigError> {
    let chat = chat.trim().trim_start_matches('@');
    if chat.is_empty() {
        return Err(ConfigError::InvalidTargetChat);
    }
    Ok(chat.to_owned())
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// SQLite connection string.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Link shown on the contact button.
    #[serde(default = "default_contact_url")]
    pub contact_url: String,

    /// Row id of the counter record.
    #[serde(default = "default_counter_id")]
    pub counter_id: i64,

    /// Amount added or subtracted per accepted press.
    #[serde(default = "default_points_step")]
    pub points_step: i64,

    /// UTC offset, in hours, of the timezone whose calendar day gates presses.
    #[serde(default)]
    pub day_utc_offset_hours: i32,

    /// Minimum interval between message edits in milliseconds (0 disables pacing).
    #[serde(default)]
    pub min_edit_interval_ms: u64,
}

fn default_database_url() -> String {
    "sqlite://social_points.db?mode=rwc".to_owned()
}

fn default_contact_url() -> String {
    "https://t.me/cg_skbid".to_owned()
}

const fn default_counter_id() -> i64 {
    1
}

const fn default_points_step() -> i64 {
    DEFAULT_POINTS_STEP
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            contact_url: default_contact_url(),
            counter_id: default_counter_id(),
            points_step: default_points_step(),
            day_utc_offset_hours: 0,
            min_edit_interval_ms: 0,
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    ///
    /// Unparseable numeric values fall back to their defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| default_database_url()),
            contact_url: std::env::var("CONTACT_URL").unwrap_or_else(|_| default_contact_url()),
            counter_id: env_parse("COUNTER_ID").unwrap_or_else(default_counter_id),
            points_step: env_parse("POINTS_STEP")
                .filter(|step: &i64| *step > 0)
                .unwrap_or_else(default_points_step),
            day_utc_offset_hours: env_parse("DAY_UTC_OFFSET_HOURS")
                .filter(|hours: &i32| (-23..=23).contains(hours))
                .unwrap_or_default(),
            min_edit_interval_ms: env_parse("MIN_EDIT_INTERVAL_MS").unwrap_or_default(),
        }
    }

    /// Returns the timezone in which calendar days are counted.
    #[must_use]
    pub fn day_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.day_utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid API ID format (must be a positive integer)")]
    InvalidApiId,

    #[error("TARGET_CHAT must be a non-empty chat username")]
    InvalidTargetChat,
}
