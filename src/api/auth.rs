//! `/api/auth` handlers: registration, login, token refresh, password reset,
//! and the caller's own profile.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::validation::{
    parse_registration_role, validate_email, validate_name, validate_password_present,
    validate_password_strength,
};
use crate::auth::{AuthError, Principal};
use crate::db::{
    AccessTokenResponse, AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse,
    RefreshTokenRequest, RegisterRequest, ResetPasswordRequest, UpdateProfileRequest, User,
    UserResponse,
};
use crate::AppState;

/// Same body whether or not the account exists
pub const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account with that email exists, a password reset link has been sent";

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("name", validate_name(&req.name))
        .check("email", validate_email(&req.email))
        .check("password", validate_password_strength(&req.password));
    let role = match parse_registration_role(req.role.as_deref()) {
        Ok(role) => role,
        Err(message) => {
            errors.add("role", message);
            None
        }
    };
    errors.finish()?;

    let session = state
        .auth
        .register(&req.name, &req.email, &req.password, role)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            user: session.user.public_view(),
            access_token: session.access_token,
            refresh_token: session.refresh_token,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("email", validate_email(&req.email))
        .check("password", validate_password_present(&req.password));
    errors.finish()?;

    let session = state.auth.login(&req.email, &req.password).await?;

    Ok(Json(AuthResponse {
        success: true,
        user: session.user.public_view(),
        access_token: session.access_token,
        refresh_token: session.refresh_token,
    }))
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Json<MessageResponse> {
    state.auth.logout(&principal.user, false);
    Json(MessageResponse::new("Logged out successfully"))
}

/// POST /api/auth/logout-all
pub async fn logout_all(
    State(state): State<Arc<AppState>>,
    principal: Principal,
) -> Json<MessageResponse> {
    state.auth.logout(&principal.user, true);
    Json(MessageResponse::new("Logged out from all devices"))
}

/// POST /api/auth/refresh-token
///
/// Every failure is a 401, including a token whose user is gone.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RefreshTokenRequest>,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let access_token = state
        .auth
        .refresh(&req.refresh_token)
        .await
        .map_err(|e| match e {
            AuthError::NotFound | AuthError::TokenInvalid | AuthError::TokenExpired => {
                ApiError::from(e).with_status(StatusCode::UNAUTHORIZED)
            }
            other => ApiError::from(other),
        })?;

    Ok(Json(AccessTokenResponse {
        success: true,
        access_token,
    }))
}

/// POST /api/auth/forgot-password
///
/// Answers immediately with a generic message; lookup, token issue and mail
/// happen in the background so neither body nor latency reveals whether the
/// email is registered.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    validate_email(&req.email).map_err(|msg| ApiError::validation_field("email", msg))?;

    let flow = state.auth.clone();
    tokio::spawn(async move {
        match flow.forgot_password(&req.email).await {
            Ok(_) => {}
            Err(AuthError::NotFound) => {
                tracing::debug!("Password reset requested for unknown email");
            }
            Err(e) => tracing::error!(error = %e, "Password reset request failed"),
        }
    });

    Ok(Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)))
}

/// POST /api/auth/reset-password
///
/// The token arrives as a form field, so token failures are 400 here.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if req.token.trim().is_empty() {
        return Err(ApiError::validation_field("token", "Token is required"));
    }
    validate_password_strength(&req.password)
        .map_err(|msg| ApiError::validation_field("password", msg))?;

    state
        .auth
        .reset_password(req.token.trim(), &req.password)
        .await
        .map_err(|e| match e {
            AuthError::TokenInvalid | AuthError::TokenExpired => {
                ApiError::from(AuthError::TokenInvalid).with_status(StatusCode::BAD_REQUEST)
            }
            other => ApiError::from(other),
        })?;

    Ok(Json(MessageResponse::new("Password reset successful")))
}

/// GET /api/auth/me
pub async fn me(principal: Principal) -> Json<UserResponse> {
    Json(principal.user.public_view())
}

/// PATCH /api/auth/me
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiJson(body): ApiJson<Map<String, Value>>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = apply_profile_update(&state, &principal, body).await?;
    Ok(Json(user.public_view()))
}

/// Validate a raw profile patch and apply it.
///
/// Any key outside `UpdateProfileRequest::ALLOWED_FIELDS` rejects the whole
/// body, so clients cannot smuggle in role or status.
pub(crate) async fn apply_profile_update(
    state: &AppState,
    principal: &Principal,
    mut body: Map<String, Value>,
) -> Result<User, ApiError> {
    if body.is_empty()
        || body
            .keys()
            .any(|k| !UpdateProfileRequest::ALLOWED_FIELDS.contains(&k.as_str()))
    {
        return Err(ApiError::bad_request("Invalid updates"));
    }

    // Form submissions carry the preferences as a JSON string
    if let Some(Value::String(raw)) = body.get("accessibilityPreferences") {
        let parsed: Value = serde_json::from_str(raw)
            .map_err(|_| ApiError::bad_request("Invalid format for accessibilityPreferences"))?;
        body.insert("accessibilityPreferences".to_string(), parsed);
    }

    let update: UpdateProfileRequest = serde_json::from_value(Value::Object(body))
        .map_err(|e| ApiError::bad_request(format!("Invalid updates: {}", e)))?;

    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &update.name {
        errors.check("name", validate_name(name));
    }
    if let Some(email) = &update.email {
        errors.check("email", validate_email(email));
    }
    if let Some(password) = &update.password {
        errors.check("password", validate_password_strength(password));
    }
    errors.finish()?;

    Ok(state.auth.update_profile(&principal.user, update).await?)
}
