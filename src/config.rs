//! Application configuration.
//!
//! Loaded from environment variables prefixed with `SHESPHERE`, nested keys
//! separated by a double underscore:
//!
//! - `SHESPHERE__SERVER__PORT=3000` -> `server.port`
//! - `SHESPHERE__DATABASE__URL=postgres://...` -> `database.url`
//! - `SHESPHERE__EMAIL__API_KEY=re_...` -> `email.api_key`
//!
//! A `.env` file is read first when present.

use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Invalid(#[from] ValidationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid host address: {0}")]
    InvalidHost(String),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Request timeout must be between 1 and 300 seconds")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool size must be between 1 and 100")]
    InvalidPoolSize,

    #[error("Invalid from email address")]
    InvalidFromEmail,

    #[error("Dispatch window and concurrency must be non-zero")]
    InvalidDispatch,

    #[error("Dispatch window must be shorter than the request timeout")]
    DispatchExceedsTimeout,

    #[error("auth.required is set but no jwt_secret is configured")]
    MissingJwtSecret,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SHESPHERE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.email.validate()?;
        self.dispatch.validate()?;
        if self.dispatch.window_secs >= self.server.request_timeout_secs {
            return Err(ValidationError::DispatchExceedsTimeout);
        }
        self.auth.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Fallback filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Comma-separated; unset means any origin.
    pub cors_origins: Option<String>,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ValidationError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ValidationError::InvalidHost(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cors_origins_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        self.socket_addr()?;
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            request_timeout_secs: default_request_timeout(),
            cors_origins: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ValidationError::InvalidDatabaseUrl);
        }
        if self.max_connections == 0 || self.max_connections > 100 {
            return Err(ValidationError::InvalidPoolSize);
        }
        Ok(())
    }
}

/// Transactional email channel. Without an API key and a sender address
/// alerts are still stored but nobody is emailed.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub api_key: Option<String>,

    pub from_email: Option<String>,

    #[serde(default = "default_from_name")]
    pub from_name: String,

    #[serde(default = "default_email_api")]
    pub api_base_url: String,

    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

impl EmailConfig {
    /// `(api_key, from_email)` when both are present and non-blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let key = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        let from = self
            .from_email
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())?;
        Some((key, from))
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs.max(1))
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if let Some((_, from)) = self.credentials() {
            if !from.contains('@') {
                return Err(ValidationError::InvalidFromEmail);
            }
        }
        Ok(())
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            from_email: None,
            from_name: default_from_name(),
            api_base_url: default_email_api(),
            send_timeout_secs: default_send_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on the whole notification phase of one alert.
    #[serde(default = "default_dispatch_window")]
    pub window_secs: u64,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl DispatchConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.window_secs == 0 || self.max_concurrency == 0 {
            return Err(ValidationError::InvalidDispatch);
        }
        Ok(())
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            window_secs: default_dispatch_window(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,

    /// Reject requests that carry no bearer token.
    #[serde(default)]
    pub required: bool,
}

impl AuthConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let has_secret = self
            .jwt_secret
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if self.required && !has_secret {
            return Err(ValidationError::MissingJwtSecret);
        }
        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_from_name() -> String {
    "Safety Alert System".to_string()
}

fn default_email_api() -> String {
    "https://api.resend.com".to_string()
}

fn default_send_timeout() -> u64 {
    10
}

fn default_dispatch_window() -> u64 {
    20
}

fn default_max_concurrency() -> usize {
    8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "SHESPHERE__DATABASE__URL",
        "SHESPHERE__SERVER__PORT",
        "SHESPHERE__EMAIL__API_KEY",
        "SHESPHERE__EMAIL__FROM_EMAIL",
        "SHESPHERE__AUTH__REQUIRED",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn loads_with_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("SHESPHERE__DATABASE__URL", "postgres://localhost/shesphere");
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.email.from_name, "Safety Alert System");
        assert!(config.email.credentials().is_none());
        assert_eq!(config.dispatch.max_concurrency, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reads_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("SHESPHERE__DATABASE__URL", "postgresql://db/shesphere");
        env::set_var("SHESPHERE__SERVER__PORT", "8088");
        env::set_var("SHESPHERE__EMAIL__API_KEY", "re_test");
        env::set_var("SHESPHERE__EMAIL__FROM_EMAIL", "alerts@shesphere.app");
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.server.port, 8088);
        assert_eq!(
            config.email.credentials(),
            Some(("re_test", "alerts@shesphere.app"))
        );
    }

    #[test]
    fn missing_database_url_fails() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert!(AppConfig::load().is_err());
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let email = EmailConfig {
            api_key: Some("  ".into()),
            from_email: Some("alerts@shesphere.app".into()),
            ..Default::default()
        };
        assert!(email.credentials().is_none());
    }

    #[test]
    fn rejects_bad_values() {
        let db = DatabaseConfig {
            url: "mysql://nope".into(),
            max_connections: 5,
            run_migrations: true,
        };
        assert_eq!(db.validate(), Err(ValidationError::InvalidDatabaseUrl));

        let server = ServerConfig {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(server.validate(), Err(ValidationError::InvalidTimeout));

        let email = EmailConfig {
            api_key: Some("re_x".into()),
            from_email: Some("not-an-address".into()),
            ..Default::default()
        };
        assert_eq!(email.validate(), Err(ValidationError::InvalidFromEmail));

        let auth = AuthConfig {
            jwt_secret: None,
            required: true,
        };
        assert_eq!(auth.validate(), Err(ValidationError::MissingJwtSecret));
    }

    #[test]
    fn dispatch_window_must_fit_in_request_timeout() {
        let mut config = AppConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: "postgres://localhost/shesphere".into(),
                max_connections: 5,
                run_migrations: true,
            },
            email: EmailConfig::default(),
            dispatch: DispatchConfig::default(),
            auth: AuthConfig::default(),
        };
        assert_eq!(config.validate(), Ok(()));

        config.dispatch.window_secs = config.server.request_timeout_secs;
        assert_eq!(
            config.validate(),
            Err(ValidationError::DispatchExceedsTimeout)
        );
    }

    #[test]
    fn cors_list_splits_and_trims() {
        let server = ServerConfig {
            cors_origins: Some("http://a.test, http://b.test,".into()),
            ..Default::default()
        };
        assert_eq!(
            server.cors_origins_list(),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }
}
