//! Configuration module for the social points bot.
//!
//! Handles loading of Telegram API credentials and bot settings
//! from the environment.

mod settings;

pub use settings::{BotSettings, ConfigError, TelegramConfig};

/// Points added or removed by a single accepted press.
pub const DEFAULT_POINTS_STEP: i64 = 5;
