//! Durable user records.
//!
//! The store is the only writer of user rows. It never hashes passwords;
//! callers hand it finished hashes. Every mutation touches one row in one
//! statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::{AuthError, AuthResult};
use super::tokens::hash_token;
use crate::db::{self, DbPool, DisabilityType, NewUser, Role, User, UserFilter, UserStatus};

/// A partial update. `None` leaves the column untouched.
///
/// Setting `password_hash` also clears any outstanding reset token in the same
/// write, so a password change revokes pending resets.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub disability_type: Option<DisabilityType>,
    pub accessibility_preferences: Option<String>,
    /// JSON-encoded contact details
    pub contact: Option<String>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Case-insensitive lookup by email
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    async fn find_by_id(&self, id: &str) -> AuthResult<Option<User>>;

    /// Fails with [`AuthError::Conflict`] when the email is taken
    async fn create(&self, user: NewUser) -> AuthResult<User>;

    /// Apply a partial update and return the new record
    async fn save(&self, id: &str, changes: &UserChanges) -> AuthResult<User>;

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> AuthResult<()>;

    /// Replace any outstanding reset token with this one
    async fn set_reset_token(&self, id: &str, token: &str, expires_at: DateTime<Utc>) -> AuthResult<()>;

    /// Matches only while the token is outstanding and unexpired
    async fn find_by_reset_token(&self, token: &str) -> AuthResult<Option<User>>;

    /// Swap in the new hash and clear the reset token, but only if `token` is
    /// still the outstanding, unexpired one. Returns whether the swap happened.
    async fn complete_password_reset(&self, id: &str, token: &str, password_hash: &str) -> AuthResult<bool>;

    /// Newest first
    async fn list(&self, filter: UserFilter) -> AuthResult<Vec<User>>;

    async fn count(&self) -> AuthResult<i64>;
}

pub struct SqliteCredentialStore {
    pool: DbPool,
}

impl SqliteCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_unique_violation(err: sqlx::Error) -> AuthError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AuthError::Conflict,
        _ => AuthError::Database(err),
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let user = sqlx::query_as("SELECT * FROM users WHERE email = ? COLLATE NOCASE")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> AuthResult<Option<User>> {
        let user = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> AuthResult<User> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = db::now_timestamp();

        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, role, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(UserStatus::Active)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| AuthError::internal("user vanished after insert"))
    }

    async fn save(&self, id: &str, changes: &UserChanges) -> AuthResult<User> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                name = COALESCE(?, name),
                email = COALESCE(?, email),
                password_hash = COALESCE(?, password_hash),
                role = COALESCE(?, role),
                status = COALESCE(?, status),
                disability_type = COALESCE(?, disability_type),
                accessibility_preferences = COALESCE(?, accessibility_preferences),
                contact = COALESCE(?, contact),
                reset_token = CASE WHEN ? IS NULL THEN reset_token ELSE NULL END,
                reset_token_expires = CASE WHEN ? IS NULL THEN reset_token_expires ELSE NULL END,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&changes.name)
        .bind(&changes.email)
        .bind(&changes.password_hash)
        .bind(changes.role)
        .bind(changes.status)
        .bind(changes.disability_type)
        .bind(&changes.accessibility_preferences)
        .bind(&changes.contact)
        .bind(&changes.password_hash)
        .bind(&changes.password_hash)
        .bind(db::now_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_unique_violation)?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound);
        }

        self.find_by_id(id).await?.ok_or(AuthError::NotFound)
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> AuthResult<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(db::timestamp(at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_reset_token(&self, id: &str, token: &str, expires_at: DateTime<Utc>) -> AuthResult<()> {
        let result = sqlx::query(
            "UPDATE users SET reset_token = ?, reset_token_expires = ?, updated_at = ? WHERE id = ?",
        )
        .bind(hash_token(token))
        .bind(db::timestamp(expires_at))
        .bind(db::now_timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::NotFound);
        }
        Ok(())
    }

    async fn find_by_reset_token(&self, token: &str) -> AuthResult<Option<User>> {
        let user = sqlx::query_as(
            "SELECT * FROM users WHERE reset_token = ? AND reset_token_expires > ?",
        )
        .bind(hash_token(token))
        .bind(db::now_timestamp())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn complete_password_reset(&self, id: &str, token: &str, password_hash: &str) -> AuthResult<bool> {
        let now = db::now_timestamp();
        let result = sqlx::query(
            r#"
            UPDATE users SET
                password_hash = ?,
                reset_token = NULL,
                reset_token_expires = NULL,
                updated_at = ?
            WHERE id = ? AND reset_token = ? AND reset_token_expires > ?
            "#,
        )
        .bind(password_hash)
        .bind(&now)
        .bind(id)
        .bind(hash_token(token))
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list(&self, filter: UserFilter) -> AuthResult<Vec<User>> {
        let users = sqlx::query_as(
            r#"
            SELECT * FROM users
            WHERE (? IS NULL OR role = ?)
              AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.role)
        .bind(filter.role)
        .bind(filter.status)
        .bind(filter.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn count(&self) -> AuthResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
