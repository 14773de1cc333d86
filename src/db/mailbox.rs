//! Offline message mailbox.
//!
//! Messages written to a registered nickname that is not signed on are held
//! here until the owner reads them; reading drains the box.

use super::DbError;
use sqlx::SqlitePool;

/// A stored offline message.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub recipient: String,
    pub sender: String,
    pub body: String,
    pub sent_at: i64,
}

/// Repository for mailbox operations.
pub struct MailboxRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MailboxRepository<'a> {
    /// Create a new mailbox repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of messages waiting for a nickname.
    pub async fn count(&self, nick: &str) -> Result<i64, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM mailbox WHERE recipient = ?")
                .bind(nick)
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }

    /// Store a message, enforcing the recipient's mailbox quota.
    ///
    /// Count and insert run in one transaction so racing writers cannot
    /// overshoot the limit.
    pub async fn store(
        &self,
        recipient: &str,
        sender: &str,
        body: &str,
        limit: i64,
    ) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM mailbox WHERE recipient = ?")
                .bind(recipient)
                .fetch_one(&mut *tx)
                .await?;
        if count >= limit {
            return Err(DbError::MailboxFull(recipient.to_string()));
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO mailbox (recipient, sender, body, sent_at) VALUES (?, ?, ?, ?)")
            .bind(recipient)
            .bind(sender)
            .bind(body)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Fetch and delete all messages for a nickname, oldest first.
    pub async fn drain(&self, nick: &str) -> Result<Vec<StoredMessage>, DbError> {
        let mut tx = self.pool.begin().await?;

        let messages = sqlx::query_as::<_, StoredMessage>(
            "SELECT id, recipient, sender, body, sent_at FROM mailbox WHERE recipient = ? ORDER BY id",
        )
        .bind(nick)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM mailbox WHERE recipient = ?")
            .bind(nick)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{DbError, NickDb};

    #[tokio::test]
    async fn test_store_and_drain_roundtrip() {
        let db = NickDb::open_in_memory().await.unwrap();
        db.mailbox().store("alice", "bob", "hi", 20).await.unwrap();
        db.mailbox().store("alice", "carol", "yo", 20).await.unwrap();

        assert_eq!(db.mailbox().count("alice").await.unwrap(), 2);
        let messages = db.mailbox().drain("alice").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, "bob");
        assert_eq!(messages[1].body, "yo");
        // Drained: box is empty now.
        assert_eq!(db.mailbox().count("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_quota_rejects_when_full() {
        let db = NickDb::open_in_memory().await.unwrap();
        db.mailbox().store("alice", "bob", "one", 2).await.unwrap();
        db.mailbox().store("alice", "bob", "two", 2).await.unwrap();
        let err = db.mailbox().store("alice", "bob", "three", 2).await.unwrap_err();
        assert!(matches!(err, DbError::MailboxFull(_)));
    }
}
