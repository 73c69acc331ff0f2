//! Telegram bot client built on grammers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grammers_client::client::UpdatesConfiguration;
use grammers_client::types::Chat;
use grammers_client::update::{CallbackQuery, Update};
use grammers_client::{
    Client, InputMessage, InvocationError, SenderPool, button, reply_markup, sender,
};
use grammers_session::storages::SqliteSession;
use grammers_tl_types as tl;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::RateLimiter;
use super::transport::{Acknowledgement, CallbackPress, Transport, TransportError};
use crate::config::TelegramConfig;
use crate::points::{Button, MESSAGE_TEXT, View};

/// Capacity of the channel carrying button presses to the dispatcher.
const PRESS_QUEUE: usize = 64;

/// Errors that can occur during Telegram operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Bot sign in failed: {0}")]
    SignInFailed(String),

    #[error("Chat not found: @{0}")]
    ChatNotFound(String),

    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Message was not modified")]
    NotModified,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("API invocation error: {0}")]
    Invocation(String),
}

impl From<InvocationError> for TelegramError {
    fn from(err: InvocationError) -> Self {
        classify_error(&err.to_string())
    }
}

impl From<TelegramError> for TransportError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::FloodWait(seconds) => {
                Self::Throttled(Duration::from_secs(u64::from(seconds)))
            }
            other => Self::Failure(other.to_string()),
        }
    }
}

/// Maps an RPC error message to a typed error.
fn classify_error(err_str: &str) -> TelegramError {
    if (err_str.contains("FLOOD_WAIT") || err_str.contains("flood"))
        && let Some(seconds) = extract_flood_wait_seconds(err_str)
    {
        return TelegramError::FloodWait(seconds);
    }

    if err_str.contains("MESSAGE_NOT_MODIFIED") {
        return TelegramError::NotModified;
    }

    TelegramError::Invocation(err_str.to_owned())
}

/// Extracts flood wait seconds from an error message.
///
/// Matching and slicing both happen on the lowercased message, whose byte
/// offsets may differ from the original's.
fn extract_flood_wait_seconds(err_msg: &str) -> Option<u32> {
    let patterns = ["flood_wait_", "flood wait ", "(value: "];
    let lower = err_msg.to_lowercase();

    for pattern in patterns {
        if let Some(idx) = lower.find(pattern) {
            let start = idx + pattern.len();
            let num_str: String = lower[start..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            if let Ok(seconds) = num_str.parse() {
                return Some(seconds);
            }
        }
    }
    None
}

/// High-level Telegram bot wrapper.
pub struct TelegramBot {
    /// The underlying grammers client.
    client: Client,

    /// Handle to the sender pool for disconnection.
    handle: sender::SenderPoolHandle,

    /// Chat carrying the counter message.
    chat: Chat,

    /// Paces edits of the counter message.
    edit_limiter: RateLimiter,

    /// Background task running the sender pool.
    _pool_task: JoinHandle<()>,

    /// Background task forwarding button presses.
    _update_task: JoinHandle<()>,
}

impl TelegramBot {
    /// Connects, signs in as a bot and resolves the target chat.
    ///
    /// Returns the bot together with the stream of button presses.
    ///
    /// # Errors
    ///
    /// Returns an error if connection, sign in or chat lookup fails.
    pub async fn connect(
        config: &TelegramConfig,
        min_edit_interval_ms: u64,
    ) -> Result<(Self, mpsc::Receiver<CallbackPress>), TelegramError> {
        info!("Connecting to Telegram...");

        let session = Arc::new(
            SqliteSession::open(&config.session_path)
                .await
                .map_err(|e| TelegramError::Session(e.to_string()))?,
        );

        let SenderPool {
            runner,
            updates,
            handle,
        } = SenderPool::new(Arc::clone(&session), config.api_id);

        let client = Client::new(handle.clone());

        // Spawn the sender pool runner
        let pool_task = tokio::spawn(async move {
            runner.run().await;
        });

        let is_authorized = client
            .is_authorized()
            .await
            .map_err(|e| TelegramError::Connection(e.to_string()))?;

        if !is_authorized {
            info!("Signing in as bot...");
            client
                .bot_sign_in(&config.bot_token, &config.api_hash)
                .await
                .map_err(|e| TelegramError::SignInFailed(e.to_string()))?;
        }

        let chat = client
            .resolve_username(&config.target_chat)
            .await?
            .ok_or_else(|| TelegramError::ChatNotFound(config.target_chat.clone()))?;

        info!("Connected to Telegram, target chat @{}", config.target_chat);

        let stream = client
            .stream_updates(
                updates,
                UpdatesConfiguration {
                    catch_up: false,
                    ..Default::default()
                },
            )
            .await;

        let (tx, rx) = mpsc::channel(PRESS_QUEUE);
        let update_task = tokio::spawn(async move {
            let mut stream = stream;
            loop {
                match stream.next().await {
                    Ok(Update::CallbackQuery(query)) => {
                        if tx.send(callback_press(&query)).await.is_err() {
                            debug!("Press receiver dropped, stopping update loop");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Failed to receive update: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Ok((
            Self {
                client,
                handle: handle.thin,
                chat,
                edit_limiter: RateLimiter::from_millis(min_edit_interval_ms),
                _pool_task: pool_task,
                _update_task: update_task,
            },
            rx,
        ))
    }

    /// Disconnects from Telegram.
    pub fn disconnect(&self) {
        info!("Disconnecting from Telegram...");
        self.handle.quit();
    }
}

#[async_trait]
impl Transport for TelegramBot {
    async fn send_view(&self, text: &str, view: &View) -> Result<i32, TransportError> {
        let message = InputMessage::text(text).reply_markup(&inline_markup(view));

        let sent = self
            .client
            .send_message(&self.chat, message)
            .await
            .map_err(TelegramError::from)?;

        info!("Sent counter message {}", sent.id());
        Ok(sent.id())
    }

    async fn edit_view(&self, message_ref: i32, view: &View) -> Result<(), TransportError> {
        let waited = self.edit_limiter.wait_and_acquire().await;
        if !waited.is_zero() {
            debug!("Waited {:?} before editing message {}", waited, message_ref);
        }

        let message = InputMessage::text(MESSAGE_TEXT).reply_markup(&inline_markup(view));

        match self
            .client
            .edit_message(&self.chat, message_ref, message)
            .await
            .map_err(TelegramError::from)
        {
            Ok(_) | Err(TelegramError::NotModified) => Ok(()),
            Err(e) => {
                if let TelegramError::FloodWait(seconds) = &e {
                    warn!("Flood wait triggered: {} seconds", seconds);
                }
                Err(e.into())
            }
        }
    }

    async fn answer_callback(
        &self,
        query_id: i64,
        ack: &Acknowledgement,
    ) -> Result<(), TransportError> {
        let request = tl::functions::messages::SetBotCallbackAnswer {
            alert: ack.alert,
            query_id,
            message: Some(ack.text.clone()),
            url: None,
            cache_time: 0,
        };

        self.client
            .invoke(&request)
            .await
            .map(|_| ())
            .map_err(|e| TelegramError::from(e).into())
    }
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("edit_limiter", &self.edit_limiter)
            .finish_non_exhaustive()
    }
}

fn callback_press(query: &CallbackQuery) -> CallbackPress {
    CallbackPress {
        query_id: query.raw.query_id,
        user_id: query.raw.user_id,
        data: query.data().to_vec(),
    }
}

/// Converts a rendered view to an inline keyboard.
fn inline_markup(view: &View) -> reply_markup::Inline {
    reply_markup::inline(
        view.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| match b {
                        Button::Url { text, url } => button::url(text, url),
                        Button::Callback { text, data } => button::inline(text, data.as_bytes()),
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>(),
    )
}
