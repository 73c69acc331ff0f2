//! Button press handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::types::CallbackAction;
use crate::points::{Direction, Outcome, UpdateCoordinator, label};
use crate::telegram::{Acknowledgement, CallbackPress, Transport};

/// Presses taking longer than this are logged.
const SLOW_PRESS: Duration = Duration::from_secs(1);

const INCREMENT_THANKS: &str = "Thank you! ✴";
const DECREMENT_THANKS: &str = "Right back at you! 📛";
const ALREADY_ACTED: &str = "You have already used your Social Points today. Come back tomorrow!";
const APOLOGY: &str = "Sorry, something went wrong. Please try again later.";

/// Turns button presses into counter updates and answers them.
pub struct CallbackHandler {
    coordinator: Arc<UpdateCoordinator>,
    transport: Arc<dyn Transport>,
}

impl CallbackHandler {
    /// Creates a new callback handler.
    #[must_use]
    pub fn new(coordinator: Arc<UpdateCoordinator>, transport: Arc<dyn Transport>) -> Self {
        Self {
            coordinator,
            transport,
        }
    }

    /// Handles a press and answers it.
    ///
    /// Never fails: every press gets an answer, and a failure to deliver
    /// that answer is only logged.
    pub async fn handle_press(&self, press: &CallbackPress) {
        let started = Instant::now();

        let ack = self.handle(press.user_id, &press.data).await;
        if let Err(e) = self.transport.answer_callback(press.query_id, &ack).await {
            warn!("Failed to answer press {}: {}", press.query_id, e);
        }

        let elapsed = started.elapsed();
        if elapsed > SLOW_PRESS {
            warn!(
                "Slow press from user {}: handled in {:.3}s",
                press.user_id,
                elapsed.as_secs_f64()
            );
        }
    }

    /// Handles the press data of `user_id` and returns the answer to show.
    pub async fn handle(&self, user_id: i64, data: &[u8]) -> Acknowledgement {
        let Some(action) = CallbackAction::parse(data) else {
            warn!(
                "Unknown callback data from user {}: {:?}",
                user_id,
                String::from_utf8_lossy(data)
            );
            return Acknowledgement::alert(APOLOGY);
        };

        debug!("User {} pressed {}", user_id, action);

        match action {
            CallbackAction::Adjust(direction) => {
                let outcome = self.coordinator.handle_action(user_id, direction).await;
                acknowledge(direction, &outcome)
            }
            CallbackAction::ShowPoints => match self.coordinator.counter().await {
                Ok(record) => Acknowledgement::notice(label(record.value)),
                Err(e) => {
                    warn!("Failed to read counter: {}", e);
                    Acknowledgement::alert(APOLOGY)
                }
            },
        }
    }
}

/// Maps an outcome to the answer shown to the user.
fn acknowledge(direction: Direction, outcome: &Outcome) -> Acknowledgement {
    match outcome {
        Outcome::Applied { value, .. } => {
            info!("Press applied, counter is {}", value);
            match direction {
                Direction::Increment => Acknowledgement::notice(INCREMENT_THANKS),
                Direction::Decrement => Acknowledgement::notice(DECREMENT_THANKS),
            }
        }
        Outcome::RateLimited => Acknowledgement::alert(ALREADY_ACTED),
        Outcome::Error(_) => Acknowledgement::alert(APOLOGY),
    }
}
