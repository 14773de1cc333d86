//! Database module for persistent storage.
//!
//! Provides async SQLite access using SQLx for the nickname account table
//! and the offline message mailbox. The chat core only ever reaches
//! persistent state through these repositories; everything else about a
//! session lives in memory.

mod accounts;
mod mailbox;

pub use accounts::{Account, AccountRepository};
pub use mailbox::{MailboxRepository, StoredMessage};

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("account already exists: {0}")]
    AccountExists(String),
    #[error("mailbox for {0} is full")]
    MailboxFull(String),
    #[error("password hashing error: {0}")]
    Hash(String),
}

/// Database handle with connection pool.
#[derive(Clone)]
pub struct NickDb {
    pool: SqlitePool,
}

impl NickDb {
    /// Open (or create) the database at the given path and apply the schema.
    pub async fn open(path: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(DbError::Sqlx)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.apply_schema().await?;
        info!(path, "Database opened");
        Ok(db)
    }

    /// Open a private in-memory database (tests, --no-database mode).
    pub async fn open_in_memory() -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(DbError::Sqlx)?;
        // A memory database vanishes when its last connection closes, so the
        // pool must keep one open for the lifetime of the handle.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.apply_schema().await?;
        Ok(db)
    }

    async fn apply_schema(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                nick           TEXT PRIMARY KEY COLLATE NOCASE,
                password_hash  TEXT,
                secure         INTEGER NOT NULL DEFAULT 0,
                admin          INTEGER NOT NULL DEFAULT 0,
                protected      INTEGER NOT NULL DEFAULT 0,
                last_login_id  TEXT,
                last_login_host TEXT,
                signon_at      INTEGER,
                signoff_at     INTEGER,
                mailbox_limit  INTEGER NOT NULL DEFAULT 20
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS mailbox (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient TEXT NOT NULL COLLATE NOCASE,
                sender    TEXT NOT NULL,
                body      TEXT NOT NULL,
                sent_at   INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_mailbox_recipient ON mailbox (recipient)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Access the account repository.
    pub fn accounts(&self) -> AccountRepository<'_> {
        AccountRepository::new(&self.pool)
    }

    /// Access the mailbox repository.
    pub fn mailbox(&self) -> MailboxRepository<'_> {
        MailboxRepository::new(&self.pool)
    }
}
