use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Include internal error detail in responses. Never enable in production.
    #[serde(default)]
    pub development: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
            development: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Signing secrets and token lifetimes.
///
/// The three secrets must differ: a token minted for one purpose must never
/// verify under another.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_secret")]
    pub access_secret: String,
    #[serde(default = "default_secret")]
    pub refresh_secret: String,
    #[serde(default = "default_secret")]
    pub reset_secret: String,
    /// Access token lifetime in seconds (default: 8 hours)
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl: i64,
    /// Refresh token lifetime in seconds (default: 7 days)
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl: i64,
    /// Reset token lifetime in seconds (default: 1 hour)
    #[serde(default = "default_reset_ttl")]
    pub reset_token_ttl: i64,
    /// Base URL of the web client, used to build password reset links
    #[serde(default = "default_reset_url_base")]
    pub reset_url_base: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: default_secret(),
            refresh_secret: default_secret(),
            reset_secret: default_secret(),
            access_token_ttl: default_access_ttl(),
            refresh_token_ttl: default_refresh_ttl(),
            reset_token_ttl: default_reset_ttl(),
            reset_url_base: default_reset_url_base(),
        }
    }
}

fn default_secret() -> String {
    // Random per process; issued tokens will not survive a restart
    uuid::Uuid::new_v4().to_string()
}

fn default_access_ttl() -> i64 {
    8 * 60 * 60
}

fn default_refresh_ttl() -> i64 {
    7 * 24 * 60 * 60
}

fn default_reset_ttl() -> i64 {
    60 * 60
}

fn default_reset_url_base() -> String {
    "http://localhost:3000".to_string()
}

/// Outbound SMTP settings for account notifications
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: default_smtp_tls(),
            from_address: None,
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

fn default_from_name() -> String {
    "Disability Support Platform".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Requests per window allowed on the public auth endpoints
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// How often stale entries are purged, in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Key buckets on `X-Forwarded-For` / `X-Real-IP`. Only enable behind a
    /// reverse proxy that overwrites those headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            auth_requests_per_window: default_auth_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
            trust_proxy_headers: false,
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_auth_requests() -> u32 {
    20
}

fn default_window_seconds() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Environment variables take precedence over the file
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("JWT_SECRET") {
            self.auth.access_secret = v;
        }
        if let Some(v) = lookup("JWT_REFRESH_SECRET") {
            self.auth.refresh_secret = v;
        }
        if let Some(v) = lookup("JWT_RESET_SECRET") {
            self.auth.reset_secret = v;
        }
        if let Some(v) = lookup("CLIENT_URL") {
            self.auth.reset_url_base = v;
        }
        if let Some(v) = lookup("SUPPORT_DIRECTORY_DEV") {
            self.server.development = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> Result<()> {
        let auth = &self.auth;
        let secrets = [
            ("access_secret", &auth.access_secret),
            ("refresh_secret", &auth.refresh_secret),
            ("reset_secret", &auth.reset_secret),
        ];

        for (name, secret) in secrets {
            if secret.is_empty() {
                bail!("auth.{} must not be empty", name);
            }
            if secret.len() < 32 {
                warn!("auth.{} is shorter than 32 characters", name);
            }
        }
        if auth.access_secret == auth.refresh_secret
            || auth.access_secret == auth.reset_secret
            || auth.refresh_secret == auth.reset_secret
        {
            bail!("auth secrets for access, refresh and reset tokens must all differ");
        }

        if auth.access_token_ttl <= 0 || auth.refresh_token_ttl <= 0 || auth.reset_token_ttl <= 0 {
            bail!("token lifetimes must be positive");
        }

        if self.rate_limit.enabled && self.rate_limit.window_seconds == 0 {
            bail!("rate_limit.window_seconds must be positive");
        }

        if self.server.development {
            warn!("Development mode is on: internal error details will be sent to clients");
        }

        Ok(())
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            email: EmailConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.auth.access_token_ttl, 28_800);
        assert_eq!(config.auth.refresh_token_ttl, 604_800);
        assert_eq!(config.auth.reset_token_ttl, 3_600);
        assert!(!config.server.development);
        assert!(!config.email.is_configured());
        assert!(!config.rate_limit.trust_proxy_headers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml(
            r#"
            [server]
            api_port = 8081

            [auth]
            access_secret = "a-very-long-access-secret-value-000"
            refresh_secret = "a-very-long-refresh-secret-value-00"
            reset_secret = "a-very-long-reset-secret-value-0000"
            access_token_ttl = 600
            "#,
        )
        .unwrap();

        assert_eq!(config.server.api_port, 8081);
        assert_eq!(config.auth.access_token_ttl, 600);
        assert_eq!(config.auth.refresh_token_ttl, 604_800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shared_secrets_rejected() {
        let mut config = Config::default();
        config.auth.reset_secret = config.auth.access_secret.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let mut config = Config::default();
        config.auth.reset_token_ttl = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("JWT_SECRET", "from-env-access"),
            ("CLIENT_URL", "https://support.example.org"),
            ("SUPPORT_DIRECTORY_DEV", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.auth.access_secret, "from-env-access");
        assert_eq!(config.auth.reset_url_base, "https://support.example.org");
        assert!(config.server.development);
    }
}
