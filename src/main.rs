//! Social Points Bot - Main Entry Point
//!
//! Keeps the shared counter message alive in the target chat and answers
//! presses on its buttons.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use social_points_bot::callbacks::CallbackHandler;
use social_points_bot::config::{BotSettings, TelegramConfig};
use social_points_bot::points::{RateGate, Renderer, UpdateCoordinator};
use social_points_bot::storage::Database;
use social_points_bot::telegram::{CallbackPress, TelegramBot, Transport};

/// Telegram bot keeping a shared, once-a-day Social Points counter.
#[derive(Parser, Debug)]
#[command(name = "social_points_bot")]
#[command(about = "Shared Social Points counter for a Telegram chat")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print the effective bot settings as JSON and exit.
    #[arg(long)]
    show_config: bool,

    /// Send a fresh counter message and point the counter at it.
    #[arg(long)]
    recreate_message: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let settings = BotSettings::from_env_with_defaults();

    if args.show_config {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    let db = Database::connect(&settings.database_url)
        .await
        .context("Failed to open database")?;

    let (bot, presses) = TelegramBot::connect(&tg_config, settings.min_edit_interval_ms)
        .await
        .context("Failed to connect to Telegram")?;

    let bot = Arc::new(bot);
    let transport: Arc<dyn Transport> = bot.clone();

    let coordinator = Arc::new(UpdateCoordinator::new(
        RateGate::new(settings.day_offset()),
        db.clone(),
        Renderer::new(settings.contact_url.clone()),
        Arc::clone(&transport),
        settings.counter_id,
        settings.points_step,
    ));

    let counter = coordinator
        .ensure_counter()
        .await
        .context("Failed to initialize the counter")?;

    if args.recreate_message {
        coordinator
            .recreate_message()
            .await
            .context("Failed to recreate the counter message")?;
    }

    info!(
        "Counter {} ready (step: {}, day offset: {})",
        counter.id,
        settings.points_step,
        settings.day_offset()
    );

    let handler = Arc::new(CallbackHandler::new(coordinator, transport));

    info!("Bot is running. Use Ctrl+C to stop.");
    run(handler, presses).await;

    // Cleanup
    info!("Shutting down...");
    bot.disconnect();
    db.close().await;

    Ok(())
}

/// Handles presses until Ctrl+C or until the update stream ends.
async fn run(handler: Arc<CallbackHandler>, mut presses: mpsc::Receiver<CallbackPress>) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            press = presses.recv() => {
                let Some(press) = press else {
                    info!("Update stream closed");
                    break;
                };

                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    handler.handle_press(&press).await;
                });
            }
        }
    }
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
