//! Outward messaging surface used by the counter logic.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::points::View;

/// Errors surfaced by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The remote side asked us to back off for the given duration.
    #[error("Throttled, retry after {0:?}")]
    Throttled(Duration),

    #[error("Transport failure: {0}")]
    Failure(String),
}

/// A pressed inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPress {
    /// Id used to answer the press.
    pub query_id: i64,
    /// User who pressed the button.
    pub user_id: i64,
    /// Raw callback data of the button.
    pub data: Vec<u8>,
}

/// Short notice shown to the user who pressed a button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub text: String,
    /// Show as a blocking alert instead of a toast.
    pub alert: bool,
}

impl Acknowledgement {
    /// A toast notice.
    #[must_use]
    pub fn notice(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alert: false,
        }
    }

    /// A blocking alert.
    #[must_use]
    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alert: true,
        }
    }
}

/// Messaging operations needed to show and update the counter.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a new message with `view` attached and returns its id.
    async fn send_view(&self, text: &str, view: &View) -> Result<i32, TransportError>;

    /// Replaces the keyboard of message `message_ref`.
    async fn edit_view(&self, message_ref: i32, view: &View) -> Result<(), TransportError>;

    /// Answers a button press.
    async fn answer_callback(
        &self,
        query_id: i64,
        ack: &Acknowledgement,
    ) -> Result<(), TransportError>;
}
