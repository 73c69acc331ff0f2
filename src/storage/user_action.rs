//! Per-user record of the last accepted press.
//!
//! Both functions take a connection so the caller decides whether they run
//! inside a transaction.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};

use super::StorageError;

/// Last accepted action of a single user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserActionRecord {
    pub user_id: i64,
    pub last_action_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct UserActionRow {
    user_id: i64,
    last_action_at: i64,
}

impl From<UserActionRow> for UserActionRecord {
    fn from(row: UserActionRow) -> Self {
        Self {
            user_id: row.user_id,
            last_action_at: DateTime::from_timestamp(row.last_action_at, 0).unwrap_or_default(),
        }
    }
}

/// Fetches the record for `user_id`, if the user has ever acted.
pub async fn get(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Option<UserActionRecord>, StorageError> {
    let row = sqlx::query_as::<_, UserActionRow>(
        "SELECT user_id, last_action_at FROM user_action WHERE user_id = ?1",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(UserActionRecord::from))
}

/// Records an action at `now` unless the user already acted at or after `cutoff`.
///
/// Insert, comparison and update run as one upsert statement. Returns
/// `true` if the action was recorded, `false` if the existing record was
/// left untouched.
pub async fn record_unless_since(
    conn: &mut SqliteConnection,
    user_id: i64,
    now: DateTime<Utc>,
    cutoff: DateTime<Utc>,
) -> Result<bool, StorageError> {
    let recorded = sqlx::query_scalar::<_, i64>(
        "INSERT INTO user_action (user_id, last_action_at) VALUES (?1, ?2)
         ON CONFLICT (user_id) DO UPDATE SET last_action_at = excluded.last_action_at
         WHERE user_action.last_action_at < ?3
         RETURNING user_id",
    )
    .bind(user_id)
    .bind(now.timestamp())
    .bind(cutoff.timestamp())
    .fetch_optional(conn)
    .await?;

    Ok(recorded.is_some())
}
