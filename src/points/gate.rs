//! Once-per-day eligibility check for presses.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::storage::{StorageError, user_action};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Allows each user one accepted press per calendar day.
///
/// Days are counted in a fixed timezone so that every user shares the same
/// midnight.
#[derive(Clone)]
pub struct RateGate {
    day_offset: FixedOffset,
    clock: Arc<dyn Clock>,
}

impl RateGate {
    /// Creates a gate counting days in `day_offset`.
    #[must_use]
    pub fn new(day_offset: FixedOffset) -> Self {
        Self::with_clock(day_offset, Arc::new(SystemClock))
    }

    /// Creates a gate with a custom time source.
    #[must_use]
    pub fn with_clock(day_offset: FixedOffset, clock: Arc<dyn Clock>) -> Self {
        Self { day_offset, clock }
    }

    /// Checks whether `user_id` may act today and records the action if so.
    ///
    /// Returns `Ok(false)` when the user already acted today. Storage errors
    /// are returned to the caller, which must treat them as a denial. When
    /// `conn` is a transaction, the record is only kept once it commits.
    pub async fn check_and_record(
        &self,
        conn: &mut SqliteConnection,
        user_id: i64,
    ) -> Result<bool, StorageError> {
        let now = self.clock.now();
        let cutoff = start_of_day(now, self.day_offset);

        let allowed = user_action::record_unless_since(conn, user_id, now, cutoff).await?;
        debug!(
            "Rate gate for user {}: {}",
            user_id,
            if allowed { "allowed" } else { "denied" }
        );

        Ok(allowed)
    }
}

impl std::fmt::Debug for RateGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate")
            .field("day_offset", &self.day_offset)
            .finish_non_exhaustive()
    }
}

/// Returns the instant the calendar day containing `now` began in `offset`.
fn start_of_day(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local = now.with_timezone(&offset);
    let into_day = Duration::seconds(i64::from(local.num_seconds_from_midnight()))
        + Duration::nanoseconds(i64::from(local.nanosecond()));
    now - into_day
}
