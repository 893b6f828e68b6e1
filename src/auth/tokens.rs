//! Signed, time-bounded tokens for the three purposes the auth core knows.
//!
//! Each [`TokenKind`] has its own HMAC secret and lifetime, and the kind is
//! also written into the claims. A token is accepted only by the key of the
//! kind it was minted for.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{AuthError, AuthResult};
use crate::config::AuthConfig;
use crate::db::{Role, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Authorizes requests to protected routes
    Access,
    /// Only exchanged for a new access token
    Refresh,
    /// Authorizes exactly one password reset
    Reset,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
            TokenKind::Reset => write!(f, "reset"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Present on access tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub kind: TokenKind,
    /// Unique per token, so two tokens minted in the same second still differ
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl SigningKey {
    fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ttl_seconds),
        }
    }
}

pub struct TokenService {
    access: SigningKey,
    refresh: SigningKey,
    reset: SigningKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access: SigningKey::new(&config.access_secret, config.access_token_ttl),
            refresh: SigningKey::new(&config.refresh_secret, config.refresh_token_ttl),
            reset: SigningKey::new(&config.reset_secret, config.reset_token_ttl),
            validation,
        }
    }

    fn key(&self, kind: TokenKind) -> &SigningKey {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
            TokenKind::Reset => &self.reset,
        }
    }

    fn issue(&self, kind: TokenKind, user: &User) -> AuthResult<(String, DateTime<Utc>)> {
        let key = self.key(kind);
        let now = Utc::now();
        let expires_at = now + key.ttl;

        let claims = Claims {
            sub: user.id.clone(),
            role: (kind == TokenKind::Access).then_some(user.role),
            kind,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &key.encoding)
            .map_err(|e| AuthError::internal(format!("Failed to sign {} token: {}", kind, e)))?;

        Ok((token, expires_at))
    }

    pub fn issue_access_token(&self, user: &User) -> AuthResult<String> {
        self.issue(TokenKind::Access, user).map(|(token, _)| token)
    }

    pub fn issue_refresh_token(&self, user: &User) -> AuthResult<String> {
        self.issue(TokenKind::Refresh, user).map(|(token, _)| token)
    }

    /// Returns the token with its expiry, which the caller mirrors into the
    /// user record.
    pub fn issue_reset_token(&self, user: &User) -> AuthResult<(String, DateTime<Utc>)> {
        self.issue(TokenKind::Reset, user)
    }

    /// Check signature, expiry and kind. Stateless: reset tokens additionally
    /// need the store cross-check before they are honored.
    pub fn verify(&self, token: &str, kind: TokenKind) -> AuthResult<Claims> {
        let data = decode::<Claims>(token, &self.key(kind).decoding, &self.validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid,
            },
        )?;

        if data.claims.kind != kind {
            return Err(AuthError::TokenInvalid);
        }

        Ok(data.claims)
    }
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::UserStatus;

    fn config() -> AuthConfig {
        AuthConfig {
            access_secret: "access-secret-for-tests-0123456789".to_string(),
            refresh_secret: "refresh-secret-for-tests-012345678".to_string(),
            reset_secret: "reset-secret-for-tests-0123456789a".to_string(),
            ..AuthConfig::default()
        }
    }

    fn user() -> User {
        User {
            id: "user-1".to_string(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            password_hash: String::new(),
            role: Role::Caregiver,
            status: UserStatus::Active,
            disability_type: None,
            accessibility_preferences: None,
            contact: None,
            reset_token: None,
            reset_token_expires: None,
            last_login: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_access_token_carries_identity_and_role() {
        let service = TokenService::new(&config());
        let token = service.issue_access_token(&user()).unwrap();
        let claims = service.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, Some(Role::Caregiver));
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn test_refresh_token_has_no_role() {
        let service = TokenService::new(&config());
        let token = service.issue_refresh_token(&user()).unwrap();
        let claims = service.verify(&token, TokenKind::Refresh).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(claims.role.is_none());
    }

    #[test]
    fn test_kinds_are_isolated() {
        let service = TokenService::new(&config());
        let reset = service.issue_reset_token(&user()).unwrap().0;
        let refresh = service.issue_refresh_token(&user()).unwrap();
        let access = service.issue_access_token(&user()).unwrap();

        assert!(matches!(service.verify(&reset, TokenKind::Access), Err(AuthError::TokenInvalid)));
        assert!(matches!(service.verify(&refresh, TokenKind::Access), Err(AuthError::TokenInvalid)));
        assert!(matches!(service.verify(&access, TokenKind::Refresh), Err(AuthError::TokenInvalid)));
        assert!(matches!(service.verify(&access, TokenKind::Reset), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn test_kind_claim_checked_even_with_shared_secret() {
        // Misconfigured deployment: same secret everywhere
        let mut shared = config();
        shared.refresh_secret = shared.access_secret.clone();
        let service = TokenService::new(&shared);

        let refresh = service.issue_refresh_token(&user()).unwrap();
        assert!(matches!(service.verify(&refresh, TokenKind::Access), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn test_expired_token() {
        let mut expired = config();
        expired.access_token_ttl = -60;
        let service = TokenService::new(&expired);

        let token = service.issue_access_token(&user()).unwrap();
        assert!(matches!(service.verify(&token, TokenKind::Access), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let service = TokenService::new(&config());
        let mut token = service.issue_access_token(&user()).unwrap();
        token.push('x');
        assert!(matches!(service.verify(&token, TokenKind::Access), Err(AuthError::TokenInvalid)));
        assert!(matches!(service.verify("garbage", TokenKind::Access), Err(AuthError::TokenInvalid)));
    }

    #[test]
    fn test_tokens_are_unique() {
        let service = TokenService::new(&config());
        let a = service.issue_access_token(&user()).unwrap();
        let b = service.issue_access_token(&user()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_reset_expiry_matches_ttl() {
        let service = TokenService::new(&config());
        let before = Utc::now();
        let (_, expires_at) = service.issue_reset_token(&user()).unwrap();
        let after = Utc::now();
        assert!(expires_at >= before + Duration::seconds(3_600));
        assert!(expires_at <= after + Duration::seconds(3_600));
    }

    #[test]
    fn test_hash_token_is_stable_hex() {
        let digest = hash_token("abc");
        assert_eq!(digest, hash_token("abc"));
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, hash_token("abd"));
    }
}
