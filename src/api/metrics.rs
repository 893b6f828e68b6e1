//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! Besides per-route request counts and latencies, the auth core reports:
//! - `auth_logins_total{outcome}`: success, invalid_credentials, disabled
//! - `auth_registrations_total`
//! - `auth_password_resets_total{outcome}`: success, rejected
//! - `users_total` gauge, refreshed on scrape

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const AUTH_LOGINS_TOTAL: &str = "auth_logins_total";
pub const AUTH_REGISTRATIONS_TOTAL: &str = "auth_registrations_total";
pub const AUTH_PASSWORD_RESETS_TOTAL: &str = "auth_password_resets_total";
pub const USERS_TOTAL: &str = "users_total";

/// Install the Prometheus recorder. Call once at startup.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(AUTH_LOGINS_TOTAL, "Login attempts by outcome");
    describe_counter!(AUTH_REGISTRATIONS_TOTAL, "Accounts created through registration");
    describe_counter!(
        AUTH_PASSWORD_RESETS_TOTAL,
        "Password reset completions by outcome"
    );
    describe_gauge!(USERS_TOTAL, "Number of user records");

    Ok(handle)
}

/// GET /metrics - Prometheus text format, no authentication.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Ok(count) = state.auth.store().count().await {
        gauge!(USERS_TOTAL).set(count as f64);
    }

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Records `http_requests_total` and `http_request_duration_seconds`,
/// labelled by the matched route template rather than the raw path.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_login(outcome: &'static str) {
    counter!(AUTH_LOGINS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_registration() {
    counter!(AUTH_REGISTRATIONS_TOTAL).increment(1);
}

pub fn record_password_reset(outcome: &'static str) {
    counter!(AUTH_PASSWORD_RESETS_TOTAL, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(HTTP_REQUESTS_TOTAL.ends_with("_total"));
        assert!(AUTH_LOGINS_TOTAL.ends_with("_total"));
        assert!(AUTH_PASSWORD_RESETS_TOTAL.ends_with("_total"));
        assert!(HTTP_REQUEST_DURATION_SECONDS.ends_with("_seconds"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_login("success");
        record_registration();
        record_password_reset("rejected");
    }
}
