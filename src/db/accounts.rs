//! Account repository for the nickname database.
//!
//! Handles registration, password checks, and the last-login bookkeeping
//! that unsecured auto-login depends on.

use super::DbError;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sqlx::SqlitePool;

/// A registered nickname account.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub nick: String,
    pub password_hash: Option<String>,
    pub secure: bool,
    pub admin: bool,
    /// Protected accounts cannot be booted from groups.
    pub protected: bool,
    pub last_login_id: Option<String>,
    pub last_login_host: Option<String>,
    pub signon_at: Option<i64>,
    pub signoff_at: Option<i64>,
    pub mailbox_limit: i64,
}

impl Account {
    /// Whether a stored last-login matches the connecting client.
    pub fn last_login_matches(&self, loginid: &str, host: &str) -> bool {
        self.last_login_id.as_deref() == Some(loginid)
            && self.last_login_host.as_deref() == Some(host)
    }
}

/// Repository for account operations.
pub struct AccountRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AccountRepository<'a> {
    /// Create a new account repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up an account by nickname (case-insensitive).
    pub async fn lookup(&self, nick: &str) -> Result<Option<Account>, DbError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT nick, password_hash, secure, admin, protected, last_login_id,
                   last_login_host, signon_at, signoff_at, mailbox_limit
            FROM accounts WHERE nick = ?
            "#,
        )
        .bind(nick)
        .fetch_optional(self.pool)
        .await?;
        Ok(account)
    }

    /// Whether an account exists for this nickname.
    pub async fn exists(&self, nick: &str) -> Result<bool, DbError> {
        Ok(self.lookup(nick).await?.is_some())
    }

    /// Register a new account with the given password.
    pub async fn register(&self, nick: &str, password: &str) -> Result<Account, DbError> {
        let password_hash = hash_password(password)?;

        sqlx::query("INSERT INTO accounts (nick, password_hash) VALUES (?, ?)")
            .bind(nick)
            .bind(&password_hash)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    return DbError::AccountExists(nick.to_string());
                }
                DbError::from(e)
            })?;

        self.lookup(nick)
            .await?
            .ok_or_else(|| DbError::AccountNotFound(nick.to_string()))
    }

    /// Verify a password against the stored hash.
    ///
    /// Returns `Ok(false)` for a wrong password or an account without one;
    /// absent accounts are reported as `AccountNotFound`.
    pub async fn check_password(&self, nick: &str, password: &str) -> Result<bool, DbError> {
        let account = self
            .lookup(nick)
            .await?
            .ok_or_else(|| DbError::AccountNotFound(nick.to_string()))?;

        let Some(stored) = account.password_hash else {
            return Ok(false);
        };

        let parsed = PasswordHash::new(&stored).map_err(|e| DbError::Hash(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Replace an account's password.
    pub async fn set_password(&self, nick: &str, password: &str) -> Result<(), DbError> {
        let password_hash = hash_password(password)?;
        let result = sqlx::query("UPDATE accounts SET password_hash = ? WHERE nick = ?")
            .bind(&password_hash)
            .bind(nick)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::AccountNotFound(nick.to_string()));
        }
        Ok(())
    }

    /// Record a successful sign-on: timestamp plus the loginid/host pair
    /// that future auto-logins are matched against.
    pub async fn set_signon(&self, nick: &str, loginid: &str, host: &str) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE accounts
            SET signon_at = ?, last_login_id = ?, last_login_host = ?
            WHERE nick = ?
            "#,
        )
        .bind(now)
        .bind(loginid)
        .bind(host)
        .bind(nick)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Record a sign-off timestamp.
    pub async fn set_signoff(&self, nick: &str) -> Result<(), DbError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("UPDATE accounts SET signoff_at = ? WHERE nick = ?")
            .bind(now)
            .bind(nick)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

/// Hash a password with Argon2 and a fresh salt.
fn hash_password(password: &str) -> Result<String, DbError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| DbError::Hash(e.to_string()))
}
