//! Per-request authentication and authorization.
//!
//! Access tokens are verified statelessly, but the user behind one is loaded
//! on every request so status and role changes take effect immediately.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::{AuthError, AuthResult};
use super::flow::AuthFlow;
use super::tokens::TokenKind;
use crate::api::ApiError;
use crate::db::{Role, User, UserStatus};
use crate::AppState;

/// The user a request acts as
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: User,
}

impl Principal {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }
}

/// Pull a bearer token out of the Authorization header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Resolve the request's access token to a user.
///
/// Every failure short of a store fault is `Unauthenticated`. Soft-deleted
/// accounts are treated as gone.
pub async fn authenticate(flow: &AuthFlow, headers: &HeaderMap) -> AuthResult<Principal> {
    let token = bearer_token(headers).ok_or(AuthError::Unauthenticated)?;

    let claims = flow.tokens().verify(token, TokenKind::Access).map_err(|e| {
        debug!(error = %e, "Rejected access token");
        AuthError::Unauthenticated
    })?;

    let user = flow
        .store()
        .find_by_id(&claims.sub)
        .await?
        .filter(|user| user.status != UserStatus::Deleted)
        .ok_or(AuthError::Unauthenticated)?;

    Ok(Principal { user })
}

pub fn require_active_status(principal: &Principal) -> AuthResult<()> {
    if principal.user.status.is_active() {
        Ok(())
    } else {
        warn!(user_id = %principal.id(), status = %principal.user.status, "Inactive account refused");
        Err(AuthError::Forbidden)
    }
}

pub fn require_role(principal: &Principal, allowed: &[Role]) -> AuthResult<()> {
    if allowed.contains(&principal.role()) {
        Ok(())
    } else {
        warn!(user_id = %principal.id(), role = %principal.role(), "Role not permitted");
        Err(AuthError::Forbidden)
    }
}

/// Authenticated and active. Use as a handler argument to protect a route.
#[async_trait]
impl FromRequestParts<Arc<AppState>> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let principal = authenticate(&state.auth, &parts.headers).await?;
        require_active_status(&principal)?;
        Ok(principal)
    }
}

/// A fixed set of roles a route admits
pub trait RolePolicy: Send + Sync + 'static {
    const ALLOWED: &'static [Role];
}

pub struct AdminOnly;

impl RolePolicy for AdminOnly {
    const ALLOWED: &'static [Role] = &[Role::Admin];
}

/// An active principal whose role passes `P`
pub struct Authorized<P: RolePolicy>(pub Principal, PhantomData<P>);

impl<P: RolePolicy> Authorized<P> {
    pub fn into_inner(self) -> Principal {
        self.0
    }
}

#[async_trait]
impl<P: RolePolicy> FromRequestParts<Arc<AppState>> for Authorized<P> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;
        require_role(&principal, P::ALLOWED)?;
        Ok(Authorized(principal, PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use axum::http::HeaderValue;

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers_with("abc")), Some("abc"));
        assert_eq!(bearer_token(&HeaderMap::new()), None);

        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&basic), None);

        let mut empty = HeaderMap::new();
        empty.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&empty), None);
    }

    #[tokio::test]
    async fn test_valid_access_token_resolves_user() {
        let (flow, _) = testing::flow().await;
        let session = flow
            .register("Ana", "ana@example.com", "Str0ngPass!", None)
            .await
            .unwrap();

        let principal = authenticate(&flow, &headers_with(&session.access_token))
            .await
            .unwrap();
        assert_eq!(principal.id(), session.user.id);
        assert!(require_active_status(&principal).is_ok());
        assert!(matches!(
            require_role(&principal, AdminOnly::ALLOWED),
            Err(AuthError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_missing_and_malformed_tokens() {
        let (flow, _) = testing::flow().await;
        assert!(matches!(
            authenticate(&flow, &HeaderMap::new()).await,
            Err(AuthError::Unauthenticated)
        ));
        assert!(matches!(
            authenticate(&flow, &headers_with("garbage")).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_refresh_and_reset_tokens_do_not_authenticate() {
        let (flow, _) = testing::flow().await;
        let session = flow
            .register("Ana", "ana@example.com", "Str0ngPass!", None)
            .await
            .unwrap();
        let reset = flow.forgot_password("ana@example.com").await.unwrap();

        for token in [&session.refresh_token, &reset] {
            assert!(matches!(
                authenticate(&flow, &headers_with(token)).await,
                Err(AuthError::Unauthenticated)
            ));
        }
    }

    #[tokio::test]
    async fn test_token_for_missing_user() {
        let (flow, _) = testing::flow().await;
        let ghost = testing::detached_user("ghost");
        let token = flow.tokens().issue_access_token(&ghost).unwrap();
        assert!(matches!(
            authenticate(&flow, &headers_with(&token)).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_status_is_rechecked_per_request() {
        let (flow, _) = testing::flow().await;
        let session = flow
            .register("Ana", "ana@example.com", "Str0ngPass!", None)
            .await
            .unwrap();
        let admin = testing::admin(&flow).await;
        flow.set_status(&admin, &session.user.id, UserStatus::Suspended)
            .await
            .unwrap();

        // Token was minted while active and is still cryptographically valid
        let principal = authenticate(&flow, &headers_with(&session.access_token))
            .await
            .unwrap();
        assert!(matches!(
            require_active_status(&principal),
            Err(AuthError::Forbidden)
        ));

        flow.set_status(&admin, &session.user.id, UserStatus::Deleted)
            .await
            .unwrap();
        assert!(matches!(
            authenticate(&flow, &headers_with(&session.access_token)).await,
            Err(AuthError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_role_read_from_store_not_token() {
        let (flow, _) = testing::flow().await;
        let session = flow
            .register("Ana", "ana@example.com", "Str0ngPass!", None)
            .await
            .unwrap();
        let admin = testing::admin(&flow).await;
        flow.set_role(&admin, &session.user.id, Role::Admin)
            .await
            .unwrap();

        let principal = authenticate(&flow, &headers_with(&session.access_token))
            .await
            .unwrap();
        assert!(require_role(&principal, AdminOnly::ALLOWED).is_ok());
    }
}
