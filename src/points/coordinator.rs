//! Applies accepted presses and keeps the counter message in sync.
//!
//! Flow of a press:
//! 1. Ask the rate gate whether the user may act today
//! 2. Apply the signed step to the counter in one atomic statement
//!    (steps 1 and 2 share a transaction, so a failed delta leaves the
//!    user's day unused)
//! 3. Under the refresh lock, re-read the counter and edit the message
//! 4. If Telegram throttles the edit, wait the requested time and retry once
//!
//! The refresh lock covers only step 3. Deltas from different users run
//! concurrently; the store guarantees none are lost. Because the refresh
//! always renders the value read under the lock, an older render can never
//! land after a newer one.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::gate::RateGate;
use super::render::{MESSAGE_TEXT, Renderer};
use crate::storage::{CounterRecord, CounterStore, Database, StorageError, counter};
use crate::telegram::{Transport, TransportError};

/// Which way a press moves the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increment,
    Decrement,
}

impl Direction {
    /// Signed change for a press with the given step.
    #[must_use]
    pub const fn delta(self, step: i64) -> i64 {
        match self {
            Self::Increment => step,
            Self::Decrement => -step,
        }
    }
}

/// Failure while handling a press.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Result of handling a press.
#[derive(Debug)]
pub enum Outcome {
    /// The counter moved and the message shows it.
    Applied { value: i64, message_ref: i32 },
    /// The user already acted today.
    RateLimited,
    /// Something failed. A stored delta is kept even if the refresh failed.
    Error(ActionError),
}

/// What the counter message currently displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Shown {
    message_ref: i32,
    value: i64,
}

/// Serializes counter updates against the single counter message.
pub struct UpdateCoordinator {
    gate: RateGate,
    db: Database,
    counters: CounterStore,
    renderer: Renderer,
    transport: Arc<dyn Transport>,
    counter_id: i64,
    step: i64,

    /// Held for the whole render-and-edit sequence.
    refresh: Mutex<Option<Shown>>,
}

impl UpdateCoordinator {
    /// Creates a coordinator for counter `counter_id`.
    #[must_use]
    pub fn new(
        gate: RateGate,
        db: Database,
        renderer: Renderer,
        transport: Arc<dyn Transport>,
        counter_id: i64,
        step: i64,
    ) -> Self {
        Self {
            gate,
            counters: db.counters(),
            db,
            renderer,
            transport,
            counter_id,
            step,
            refresh: Mutex::new(None),
        }
    }

    /// Handles a press by `user_id`.
    pub async fn handle_action(&self, user_id: i64, direction: Direction) -> Outcome {
        let record = match self.record_press(user_id, direction).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("User {} already acted today", user_id);
                return Outcome::RateLimited;
            }
            Err(e) => {
                error!("Failed to apply {:?} for user {}: {}", direction, user_id, e);
                return Outcome::Error(e.into());
            }
        };

        info!(
            "User {} applied {:?}, counter is now {}",
            user_id, direction, record.value
        );

        if let Err(e) = self.refresh().await {
            warn!(
                "Counter is {} but the message could not be updated: {}",
                record.value, e
            );
            return Outcome::Error(e);
        }

        Outcome::Applied {
            value: record.value,
            message_ref: record.message_ref,
        }
    }

    /// Runs the rate gate and the delta in one transaction.
    ///
    /// Returns `None` when the user already acted today. On any error
    /// neither write is kept.
    async fn record_press(
        &self,
        user_id: i64,
        direction: Direction,
    ) -> Result<Option<CounterRecord>, StorageError> {
        let mut tx = self.db.begin().await?;

        if !self.gate.check_and_record(&mut tx, user_id).await? {
            return Ok(None);
        }

        let record =
            counter::apply_delta(&mut tx, self.counter_id, direction.delta(self.step)).await?;
        tx.commit().await?;

        Ok(Some(record))
    }

    /// Re-renders the stored counter into its message.
    ///
    /// Skips the edit when the message already shows the stored value.
    pub async fn refresh(&self) -> Result<(), ActionError> {
        let mut shown = self.refresh.lock().await;

        let record = self.counter().await?;
        let current = Shown {
            message_ref: record.message_ref,
            value: record.value,
        };

        if *shown == Some(current) {
            debug!("Message already shows {}, skipping edit", record.value);
            return Ok(());
        }

        self.edit_with_retry(&record).await?;
        *shown = Some(current);
        Ok(())
    }

    /// Makes sure the counter and its message exist.
    ///
    /// Sends a fresh message and creates the counter with value 0 on a new
    /// deployment. Otherwise brings the existing message up to date; a
    /// failure there is logged and does not prevent startup.
    pub async fn ensure_counter(&self) -> Result<CounterRecord, ActionError> {
        if let Some(record) = self.counters.get_counter(self.counter_id).await? {
            info!(
                "Found counter {} on message {} with value {}",
                record.id, record.message_ref, record.value
            );
            if let Err(e) = self.refresh().await {
                warn!("Failed to refresh counter message on startup: {}", e);
            }
            return Ok(record);
        }

        let mut shown = self.refresh.lock().await;

        let view = self.renderer.render(0);
        let message_ref = self.transport.send_view(MESSAGE_TEXT, &view).await?;
        let record = self
            .counters
            .create_counter(self.counter_id, message_ref, 0)
            .await?;

        info!("Created counter {} on message {}", record.id, message_ref);
        *shown = Some(Shown {
            message_ref,
            value: 0,
        });
        Ok(record)
    }

    /// Sends a new counter message and points the counter at it.
    pub async fn recreate_message(&self) -> Result<CounterRecord, ActionError> {
        let mut shown = self.refresh.lock().await;

        let rendered = self.counter().await?.value;
        let view = self.renderer.render(rendered);
        let message_ref = self.transport.send_view(MESSAGE_TEXT, &view).await?;
        let record = self
            .counters
            .set_message_ref(self.counter_id, message_ref)
            .await?;

        info!(
            "Counter {} moved to message {} (value {})",
            record.id, message_ref, rendered
        );
        *shown = Some(Shown {
            message_ref,
            value: rendered,
        });
        Ok(record)
    }

    /// Reads the stored counter.
    pub async fn counter(&self) -> Result<CounterRecord, StorageError> {
        self.counters
            .get_counter(self.counter_id)
            .await?
            .ok_or(StorageError::NotFound(self.counter_id))
    }

    /// Edits the message, retrying exactly once after a throttle.
    async fn edit_with_retry(&self, record: &CounterRecord) -> Result<(), TransportError> {
        let view = self.renderer.render(record.value);

        match self.transport.edit_view(record.message_ref, &view).await {
            Err(TransportError::Throttled(wait)) => {
                warn!("Edit throttled, retrying once in {:?}", wait);
                tokio::time::sleep(wait).await;
                self.transport.edit_view(record.message_ref, &view).await
            }
            result => result,
        }
    }
}

impl std::fmt::Debug for UpdateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateCoordinator")
            .field("counter_id", &self.counter_id)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use chrono::{FixedOffset, TimeZone, Utc};

    use super::*;
    use crate::points::View;
    use crate::points::gate::tests::ManualClock;
    use crate::points::render::label;
    use crate::storage::{UserActionRecord, user_action};
    use crate::telegram::fake::FakeTransport;

    pub(crate) struct Harness {
        pub(crate) db: Database,
        pub(crate) clock: Arc<ManualClock>,
        pub(crate) transport: Arc<FakeTransport>,
        pub(crate) coordinator: Arc<UpdateCoordinator>,
    }

    pub(crate) async fn harness() -> Harness {
        let db = Database::in_memory().await.unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        let transport = Arc::new(FakeTransport::default());

        let gate = RateGate::with_clock(FixedOffset::east_opt(0).unwrap(), clock.clone());
        let coordinator = Arc::new(UpdateCoordinator::new(
            gate,
            db.clone(),
            Renderer::new("https://t.me/owner"),
            transport.clone(),
            1,
            5,
        ));

        Harness {
            db,
            clock,
            transport,
            coordinator,
        }
    }

    impl Harness {
        pub(crate) async fn last_action(&self, user_id: i64) -> Option<UserActionRecord> {
            let mut tx = self.db.begin().await.unwrap();
            user_action::get(&mut tx, user_id).await.unwrap()
        }

        /// Makes every new user action fail inside the database.
        pub(crate) async fn break_user_actions(&self) {
            let mut tx = self.db.begin().await.unwrap();
            sqlx::raw_sql(
                "CREATE TRIGGER reject_user_action BEFORE INSERT ON user_action
                 BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
            )
            .execute(&mut *tx)
            .await
            .unwrap();
            tx.commit().await.unwrap();
        }
    }

    pub(crate) fn shown_label(view: &View) -> &str {
        view.rows[1][0].text()
    }

    #[test]
    fn test_direction_delta() {
        assert_eq!(Direction::Increment.delta(5), 5);
        assert_eq!(Direction::Decrement.delta(5), -5);
    }

    #[tokio::test]
    async fn test_fresh_deployment_creates_counter() {
        let h = harness().await;

        let record = h.coordinator.ensure_counter().await.unwrap();
        assert_eq!(record.value, 0);
        assert_eq!(record.message_ref, 100);

        let sent = h.transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(shown_label(&sent[0].1), label(0));

        let stored = h.db.counters().get_counter(1).await.unwrap();
        assert_eq!(stored, Some(record));
    }

    #[tokio::test]
    async fn test_existing_counter_is_reused() {
        let h = harness().await;
        h.db.counters().create_counter(1, 55, 20).await.unwrap();

        let record = h.coordinator.ensure_counter().await.unwrap();
        assert_eq!(record.message_ref, 55);
        assert!(h.transport.sent.lock().unwrap().is_empty());

        // The message is brought up to date with the stored value
        let (message_ref, view) = h.transport.last_edit().unwrap();
        assert_eq!(message_ref, 55);
        assert_eq!(shown_label(&view), label(20));
    }

    #[tokio::test]
    async fn test_same_day_second_press_is_rate_limited() {
        let h = harness().await;
        h.coordinator.ensure_counter().await.unwrap();

        let outcome = h.coordinator.handle_action(1, Direction::Increment).await;
        assert!(matches!(
            outcome,
            Outcome::Applied {
                value: 5,
                message_ref: 100
            }
        ));

        h.clock.set(Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0).unwrap());
        let outcome = h.coordinator.handle_action(1, Direction::Decrement).await;
        assert!(matches!(outcome, Outcome::RateLimited));

        let record = h.db.counters().get_counter(1).await.unwrap().unwrap();
        assert_eq!(record.value, 5);
        assert_eq!(h.transport.edit_count(), 1);
    }

    #[tokio::test]
    async fn test_next_day_press_is_applied() {
        let h = harness().await;
        h.coordinator.ensure_counter().await.unwrap();
        h.coordinator.handle_action(1, Direction::Increment).await;

        h.clock.set(Utc.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap());
        let outcome = h.coordinator.handle_action(2, Direction::Decrement).await;
        assert!(matches!(outcome, Outcome::Applied { value: 0, .. }));

        let (_, view) = h.transport.last_edit().unwrap();
        assert_eq!(shown_label(&view), label(0));
    }

    #[tokio::test]
    async fn test_missing_counter_is_an_error() {
        let h = harness().await;

        let outcome = h.coordinator.handle_action(1, Direction::Increment).await;
        assert!(matches!(
            outcome,
            Outcome::Error(ActionError::Storage(StorageError::NotFound(1)))
        ));
    }

    #[tokio::test]
    async fn test_failed_delta_does_not_use_up_the_day() {
        let h = harness().await;

        let outcome = h.coordinator.handle_action(1, Direction::Increment).await;
        assert!(matches!(outcome, Outcome::Error(ActionError::Storage(_))));
        assert!(h.last_action(1).await.is_none());

        // Once the counter exists the same user may still press today
        h.coordinator.ensure_counter().await.unwrap();
        let outcome = h.coordinator.handle_action(1, Direction::Increment).await;
        assert!(matches!(outcome, Outcome::Applied { value: 5, .. }));
        assert!(h.last_action(1).await.is_some());
    }

    #[tokio::test]
    async fn test_gate_storage_failure_denies_press() {
        let h = harness().await;
        h.coordinator.ensure_counter().await.unwrap();
        h.break_user_actions().await;

        let outcome = h.coordinator.handle_action(1, Direction::Increment).await;
        assert!(matches!(
            outcome,
            Outcome::Error(ActionError::Storage(StorageError::Database(_)))
        ));

        assert!(h.last_action(1).await.is_none());
        assert_eq!(h.coordinator.counter().await.unwrap().value, 0);
        assert_eq!(h.transport.edit_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_database_denies_press() {
        let h = harness().await;
        h.coordinator.ensure_counter().await.unwrap();
        h.db.close().await;

        let outcome = h.coordinator.handle_action(1, Direction::Increment).await;
        assert!(matches!(outcome, Outcome::Error(ActionError::Storage(_))));
        assert_eq!(h.transport.edit_count(), 0);
    }

    #[tokio::test]
    async fn test_throttled_edit_is_retried_once() {
        let h = harness().await;
        h.coordinator.ensure_counter().await.unwrap();
        h.transport.script_edits([Err(TransportError::Throttled(Duration::from_millis(300)))]);

        let started = tokio::time::Instant::now();
        let outcome = h.coordinator.handle_action(1, Direction::Increment).await;

        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(matches!(outcome, Outcome::Applied { value: 5, .. }));
        assert_eq!(h.transport.edit_count(), 1);
    }

    #[tokio::test]
    async fn test_second_throttle_reports_error_and_keeps_delta() {
        let h = harness().await;
        h.coordinator.ensure_counter().await.unwrap();
        h.transport.script_edits([
            Err(TransportError::Throttled(Duration::from_millis(50))),
            Err(TransportError::Throttled(Duration::from_millis(50))),
        ]);

        let outcome = h.coordinator.handle_action(1, Direction::Increment).await;
        assert!(matches!(
            outcome,
            Outcome::Error(ActionError::Transport(TransportError::Throttled(_)))
        ));

        // No further attempts and no rollback
        assert_eq!(h.transport.edit_count(), 0);
        let record = h.db.counters().get_counter(1).await.unwrap().unwrap();
        assert_eq!(record.value, 5);

        // The next refresh catches the message up
        h.coordinator.refresh().await.unwrap();
        let (_, view) = h.transport.last_edit().unwrap();
        assert_eq!(shown_label(&view), label(5));
    }

    #[tokio::test]
    async fn test_plain_failure_is_not_retried() {
        let h = harness().await;
        h.coordinator.ensure_counter().await.unwrap();
        h.transport.script_edits([Err(TransportError::Failure("boom".to_owned()))]);

        let outcome = h.coordinator.handle_action(1, Direction::Increment).await;
        assert!(matches!(
            outcome,
            Outcome::Error(ActionError::Transport(TransportError::Failure(_)))
        ));
        assert_eq!(h.transport.edit_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_with_unchanged_value_is_idempotent() {
        let h = harness().await;
        h.coordinator.ensure_counter().await.unwrap();
        h.coordinator.handle_action(1, Direction::Increment).await;

        h.coordinator.refresh().await.unwrap();
        h.coordinator.refresh().await.unwrap();

        assert_eq!(h.transport.edit_count(), 1);
        let record = h.db.counters().get_counter(1).await.unwrap().unwrap();
        assert_eq!(record.value, 5);
    }

    #[tokio::test]
    async fn test_concurrent_presses_end_on_fresh_value() {
        let h = harness().await;
        h.coordinator.ensure_counter().await.unwrap();
        h.transport.delay_edits(Duration::from_millis(5));

        let tasks: Vec<_> = (1..=20)
            .map(|user_id| {
                let coordinator = Arc::clone(&h.coordinator);
                let direction = if user_id % 4 == 0 {
                    Direction::Decrement
                } else {
                    Direction::Increment
                };
                tokio::spawn(async move { coordinator.handle_action(user_id, direction).await })
            })
            .collect();

        for task in tasks {
            assert!(matches!(task.await.unwrap(), Outcome::Applied { .. }));
        }

        // 15 increments and 5 decrements of 5
        let record = h.db.counters().get_counter(1).await.unwrap().unwrap();
        assert_eq!(record.value, 50);

        let (_, view) = h.transport.last_edit().unwrap();
        assert_eq!(shown_label(&view), label(50));
    }

    #[tokio::test]
    async fn test_recreate_message() {
        let h = harness().await;
        h.coordinator.ensure_counter().await.unwrap();
        h.coordinator.handle_action(1, Direction::Decrement).await;

        let record = h.coordinator.recreate_message().await.unwrap();
        assert_eq!(record.message_ref, 101);
        assert_eq!(record.value, -5);

        let sent = h.transport.sent.lock().unwrap().clone();
        assert_eq!(shown_label(&sent[1].1), label(-5));
    }
}
