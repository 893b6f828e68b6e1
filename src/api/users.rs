//! `/api/users` handlers: the caller's account and admin user management.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::auth::apply_profile_update;
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::validation::{
    parse_role, parse_status, validate_contact_field, validate_password_present,
    validate_password_strength, validate_phone,
};
use crate::auth::{AdminOnly, Authorized, Principal};
use crate::db::{
    ChangePasswordRequest, EmergencyContact, ListUsersQuery, MessageResponse, UpdateRoleRequest,
    UpdateStatusRequest, UserEnvelope, UserFilter, UserListResponse,
};
use crate::AppState;

/// GET /api/users/me
pub async fn get_me(principal: Principal) -> Json<UserEnvelope> {
    Json(UserEnvelope {
        success: true,
        user: principal.user.public_view(),
    })
}

/// PATCH /api/users/me
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiJson(body): ApiJson<Map<String, Value>>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let user = apply_profile_update(&state, &principal, body).await?;
    Ok(Json(UserEnvelope {
        success: true,
        user: user.public_view(),
    }))
}

/// PATCH /api/users/me/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("currentPassword", validate_password_present(&req.current_password))
        .check("newPassword", validate_password_strength(&req.new_password));
    errors.finish()?;

    state
        .auth
        .change_password(&principal.user, &req.current_password, &req.new_password)
        .await?;

    Ok(Json(MessageResponse::new("Password updated successfully")))
}

/// POST /api/users/me/emergency-contact
pub async fn update_emergency_contact(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    ApiJson(req): ApiJson<EmergencyContact>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("name", validate_contact_field("Name", &req.name))
        .check("relation", validate_contact_field("Relation", &req.relation))
        .check("phone", validate_phone(&req.phone));
    errors.finish()?;

    let user = state.auth.update_emergency_contact(&principal.user, req).await?;
    Ok(Json(UserEnvelope {
        success: true,
        user: user.public_view(),
    }))
}

/// GET /api/users?role=&status=
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: Authorized<AdminOnly>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    let role = query
        .role
        .as_deref()
        .map(parse_role)
        .transpose()
        .map_err(|msg| ApiError::validation_field("role", msg))?;
    let status = query
        .status
        .as_deref()
        .map(parse_status)
        .transpose()
        .map_err(|msg| ApiError::validation_field("status", msg))?;

    let users = state.auth.list_users(UserFilter { role, status }).await?;
    let users: Vec<_> = users.iter().map(|u| u.public_view()).collect();

    Ok(Json(UserListResponse {
        success: true,
        count: users.len(),
        users,
    }))
}

/// PATCH /api/users/:id/role
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    admin: Authorized<AdminOnly>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let role = parse_role(&req.role).map_err(|msg| ApiError::validation_field("role", msg))?;
    let admin = admin.into_inner();

    let user = state.auth.set_role(&admin.user, &id, role).await?;
    Ok(Json(UserEnvelope {
        success: true,
        user: user.public_view(),
    }))
}

/// PATCH /api/users/:id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    admin: Authorized<AdminOnly>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateStatusRequest>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let status =
        parse_status(&req.status).map_err(|msg| ApiError::validation_field("status", msg))?;
    let admin = admin.into_inner();

    if admin.user.id == id {
        return Err(ApiError::bad_request("You cannot change your own status"));
    }

    let user = state.auth.set_status(&admin.user, &id, status).await?;
    Ok(Json(UserEnvelope {
        success: true,
        user: user.public_view(),
    }))
}
