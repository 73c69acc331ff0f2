//! The shared counter row.

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use super::StorageError;

/// The single counter displayed by the bot message.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CounterRecord {
    /// Row identifier.
    pub id: i64,

    /// Id of the Telegram message showing the counter.
    pub message_ref: i32,

    /// Current number of points. May be negative.
    pub value: i64,
}

/// Accessor for the `counter` table.
#[derive(Debug, Clone)]
pub struct CounterStore {
    pool: SqlitePool,
}

impl CounterStore {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Fetches the counter with the given id, if it exists.
    pub async fn get_counter(&self, id: i64) -> Result<Option<CounterRecord>, StorageError> {
        let record = sqlx::query_as::<_, CounterRecord>(
            "SELECT id, message_ref, value FROM counter WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Creates the counter row.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if a row with `id` is present.
    pub async fn create_counter(
        &self,
        id: i64,
        message_ref: i32,
        initial_value: i64,
    ) -> Result<CounterRecord, StorageError> {
        let now = Utc::now().timestamp();

        let record = sqlx::query_as::<_, CounterRecord>(
            "INSERT INTO counter (id, message_ref, value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (id) DO NOTHING
             RETURNING id, message_ref, value",
        )
        .bind(id)
        .bind(message_ref)
        .bind(initial_value)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::AlreadyExists(id))?;

        debug!("Created counter {} on message {} with value {}", id, message_ref, initial_value);
        Ok(record)
    }

    /// Points the counter at a newly sent message.
    pub async fn set_message_ref(
        &self,
        id: i64,
        message_ref: i32,
    ) -> Result<CounterRecord, StorageError> {
        sqlx::query_as::<_, CounterRecord>(
            "UPDATE counter SET message_ref = ?1, updated_at = ?2
             WHERE id = ?3
             RETURNING id, message_ref, value",
        )
        .bind(message_ref)
        .bind(Utc::now().timestamp())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::NotFound(id))
    }
}

/// Adds `delta` to counter `id` and returns the updated row.
///
/// The addition and the read-back happen in one statement, so concurrent
/// callers can never lose each other's updates.
///
/// # Errors
///
/// Returns [`StorageError::NotFound`] if the counter does not exist.
pub async fn apply_delta(
    conn: &mut SqliteConnection,
    id: i64,
    delta: i64,
) -> Result<CounterRecord, StorageError> {
    let record = sqlx::query_as::<_, CounterRecord>(
        "UPDATE counter SET value = value + ?1, updated_at = ?2
         WHERE id = ?3
         RETURNING id, message_ref, value",
    )
    .bind(delta)
    .bind(Utc::now().timestamp())
    .bind(id)
    .fetch_optional(conn)
    .await?
    .ok_or(StorageError::NotFound(id))?;

    debug!("Applied delta {:+} to counter {}: now {}", delta, id, record.value);
    Ok(record)
}
