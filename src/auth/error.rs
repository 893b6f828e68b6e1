//! Failure kinds of the authentication core.
//!
//! Every variant except `Database` and `Internal` is an expected outcome the
//! caller can act on. Those two are faults: logged in full server-side and
//! reported to clients without detail.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),

    /// The email is already registered
    #[error("Email already in use")]
    Conflict,

    /// Unknown email or wrong password. One message for both causes.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    /// Missing, malformed, invalid or expired access token, or the user behind
    /// it no longer exists
    #[error("Please authenticate")]
    Unauthenticated,

    #[error("Access denied")]
    Forbidden,

    #[error("Invalid or expired token")]
    TokenInvalid,

    #[error("Token has expired")]
    TokenExpired,

    #[error("User not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn validation(message: impl Into<String>) -> Self {
        AuthError::Validation(message.into())
    }

    pub fn internal(message: impl std::fmt::Display) -> Self {
        AuthError::Internal(message.to_string())
    }

    /// True for faults outside the taxonomy (store outage, hashing failure)
    pub fn is_fault(&self) -> bool {
        matches!(self, AuthError::Database(_) | AuthError::Internal(_))
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
