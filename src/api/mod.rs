mod auth;
pub mod error;
pub mod metrics;
pub mod rate_limit;
mod users;
pub mod validation;

pub use error::{set_expose_internal_errors, ApiError, ApiJson};

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Public credential endpoints, rate limited per client
    let credential_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    let auth_routes = Router::new()
        .route("/refresh-token", post(auth::refresh_token))
        .route("/logout", post(auth::logout))
        .route("/logout-all", post(auth::logout_all))
        .route("/me", get(auth::me).patch(auth::update_me))
        .merge(credential_routes);

    // Authorization is enforced per handler by the Principal / Authorized extractors
    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/me", get(users::get_me).patch(users::update_me))
        .route("/me/password", patch(users::change_password))
        .route("/me/emergency-contact", post(users::update_emergency_contact))
        .route("/:id/role", patch(users::update_role))
        .route("/:id/status", patch(users::update_status));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
