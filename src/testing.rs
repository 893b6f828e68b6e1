//! Shared fixtures for unit and HTTP tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use crate::auth::{hash_password, AuthFlow, SqliteCredentialStore, TokenService};
use crate::config::{AuthConfig, Config};
use crate::db::{self, NewUser, Role, User, UserStatus};
use crate::notifications::{Notification, Notifier};
use crate::AppState;

/// Records every notification; optionally fails each send after recording
/// the attempt.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Notification)>>,
    attempts: AtomicUsize,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, to: &str, notification: &Notification) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("smtp unreachable"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), notification.clone()));
        Ok(())
    }
}

/// Wait for background dispatches to land
pub async fn wait_for_sent(notifier: &RecordingNotifier, count: usize) -> Vec<(String, Notification)> {
    for _ in 0..500 {
        let sent = notifier.sent();
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} notifications, got {:?}", count, notifier.sent());
}

pub async fn wait_for_attempts(notifier: &RecordingNotifier, count: usize) {
    for _ in 0..500 {
        if notifier.attempts() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} notification attempts, got {}", count, notifier.attempts());
}

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        access_secret: "test-access-secret-0123456789abcdef".to_string(),
        refresh_secret: "test-refresh-secret-0123456789abcde".to_string(),
        reset_secret: "test-reset-secret-0123456789abcdefg".to_string(),
        ..AuthConfig::default()
    }
}

pub fn config() -> Config {
    let mut config = Config::default();
    config.auth = auth_config();
    config.rate_limit.auth_requests_per_window = 1_000;
    config
}

pub async fn flow_with_config(config: AuthConfig) -> (AuthFlow, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let pool = db::init_in_memory().await.unwrap();
    let flow = AuthFlow::new(
        Arc::new(SqliteCredentialStore::new(pool)),
        Arc::new(TokenService::new(&config)),
        notifier.clone(),
        config.reset_url_base.clone(),
    );
    (flow, notifier)
}

pub async fn flow() -> (AuthFlow, Arc<RecordingNotifier>) {
    flow_with_config(auth_config()).await
}

pub async fn flow_with_notifier(notifier: Arc<RecordingNotifier>) -> AuthFlow {
    let config = auth_config();
    let pool = db::init_in_memory().await.unwrap();
    AuthFlow::new(
        Arc::new(SqliteCredentialStore::new(pool)),
        Arc::new(TokenService::new(&config)),
        notifier,
        config.reset_url_base.clone(),
    )
}

/// Insert an admin directly; admins cannot self-register
pub async fn admin(flow: &AuthFlow) -> User {
    flow.store()
        .create(NewUser {
            name: "Root Admin".to_string(),
            email: "admin@example.com".to_string(),
            password_hash: hash_password("Adm1nPass!").unwrap(),
            role: Role::Admin,
        })
        .await
        .unwrap()
}

/// A user that was never persisted
pub fn detached_user(id: &str) -> User {
    let now = db::now_timestamp();
    User {
        id: id.to_string(),
        name: "Ghost".to_string(),
        email: format!("{}@example.com", id),
        password_hash: String::new(),
        role: Role::User,
        status: UserStatus::Active,
        disability_type: None,
        accessibility_preferences: None,
        contact: None,
        reset_token: None,
        reset_token_expires: None,
        last_login: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

pub async fn app_with_config(config: Config) -> (Router, Arc<AppState>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let pool = db::init_in_memory().await.unwrap();
    let state = Arc::new(AppState::new(config, pool, notifier.clone()));
    (crate::api::create_router(state.clone()), state, notifier)
}

pub async fn app() -> (Router, Arc<AppState>, Arc<RecordingNotifier>) {
    app_with_config(config()).await
}

/// Issue one request against the router and decode the JSON body
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<&str>,
) -> (StatusCode, Value) {
    let bearer = token.map(|t| format!("Bearer {}", t));
    match bearer.as_deref() {
        Some(auth) => send_with_headers(app, method, uri, &[("authorization", auth)], body).await,
        None => send_with_headers(app, method, uri, &[], body).await,
    }
}

/// Like [`send`], with arbitrary extra request headers
pub async fn send_with_headers(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

pub async fn send_raw(app: &Router, method: &str, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}
