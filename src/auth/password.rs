//! One-way password hashing with Argon2id.
//!
//! Hashing is CPU-bound by design, so the async entry points run it on the
//! blocking pool instead of a runtime worker.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;

use super::error::{AuthError, AuthResult};

lazy_static! {
    /// Verified against when the account does not exist, so an unknown email
    /// costs the same as a wrong password.
    static ref DUMMY_HASH: String =
        hash_password("timing-equalizer-not-a-real-password").unwrap_or_default();
}

/// Hash a password using Argon2 with a fresh random salt
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash. A malformed hash never verifies.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub async fn hash_password_async(password: &str) -> AuthResult<String> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(AuthError::internal)?
        .map_err(|e| AuthError::internal(format!("Failed to hash password: {}", e)))
}

pub async fn verify_password_async(password: &str, hash: &str) -> AuthResult<bool> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(AuthError::internal)
}

/// Compute the equalizer hash on the blocking pool. Called at startup so the
/// first unknown-email login does not pay for a hash on top of a verify.
pub async fn warm_dummy_hash() -> AuthResult<()> {
    tokio::task::spawn_blocking(|| lazy_static::initialize(&DUMMY_HASH))
        .await
        .map_err(AuthError::internal)
}

/// Burn one verification's worth of work against a fixed hash
pub async fn verify_dummy(password: &str) {
    let password = password.to_owned();
    // Deref inside the closure: a cold DUMMY_HASH is hashed off the runtime
    let _ = tokio::task::spawn_blocking(move || verify_password(&password, &DUMMY_HASH)).await;
}
