//! Persistent storage for the shared counter and per-user actions.
//!
//! Backed by SQLite through `sqlx`. Every mutating operation is a single
//! SQL statement, so concurrent callers never observe a half-applied change.
//! Operations that must succeed or fail together take a connection and run
//! inside a transaction from [`Database::begin`].

pub mod counter;
pub mod user_action;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;
use tracing::info;

pub use counter::{CounterRecord, CounterStore};
pub use user_action::UserActionRecord;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS counter (
    id          INTEGER PRIMARY KEY,
    message_ref INTEGER NOT NULL,
    value       INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_action (
    user_id        INTEGER PRIMARY KEY,
    last_action_at INTEGER NOT NULL
);
";

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Counter {0} not found")]
    NotFound(i64),

    #[error("Counter {0} already exists")]
    AlreadyExists(i64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Handle to the bot database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the database at `url` and creates the schema if needed.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        info!("Connected to database");
        Self::from_pool(pool).await
    }

    /// Opens a private in-memory database.
    ///
    /// The pool is capped at one connection since every in-memory
    /// connection would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, StorageError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns the counter table accessor.
    #[must_use]
    pub fn counters(&self) -> CounterStore {
        CounterStore::new(self.pool.clone())
    }

    /// Starts a transaction. Dropping it without a commit rolls it back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StorageError> {
        Ok(self.pool.begin().await?)
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
