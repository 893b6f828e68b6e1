pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod notifications;

#[cfg(test)]
mod testing;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::auth::{AuthFlow, SqliteCredentialStore, TokenService};
use crate::notifications::Notifier;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub auth: AuthFlow,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, notifier: Arc<dyn Notifier>) -> Self {
        let store = Arc::new(SqliteCredentialStore::new(db.clone()));
        let tokens = Arc::new(TokenService::new(&config.auth));
        let auth = AuthFlow::new(store, tokens, notifier, config.auth.reset_url_base.clone());
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            auth,
            rate_limiter,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
