//! Configuration management

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::errors::{ApiError, Result};

/// Client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub health: HealthConfig,
    pub retry: RetrySettings,
    pub auth: AuthConfig,
    pub realtime: RealtimeConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the services cannot run with.
    ///
    /// A zero `heartbeat_interval_ms` is allowed and turns the realtime
    /// heartbeat off.
    ///
    /// # Errors
    /// `ApiError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let positive = |value: u64, field: &str| {
            if value == 0 {
                Err(ApiError::Config(format!("{field} must be greater than zero")))
            } else {
                Ok(())
            }
        };
        let factor = |value: f64, field: &str| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ApiError::Config(format!("{field} must be a positive number, got {value}")))
            }
        };

        positive(self.api.timeout_ms, "api.timeout_ms")?;
        positive(self.health.check_interval_ms, "health.check_interval_ms")?;
        positive(self.health.check_timeout_ms, "health.check_timeout_ms")?;
        factor(self.retry.backoff_factor, "retry.backoff_factor")?;
        factor(self.realtime.reconnect_factor, "realtime.reconnect_factor")
    }
}

/// REST backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Versioned base URL, e.g. `https://rent.example.com/api/v1`
    pub base_url: String,
    pub timeout_ms: u64,
    /// Extra headers added to every request.
    pub default_headers: BTreeMap<String, String>,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            default_headers: BTreeMap::new(),
        }
    }
}

/// Health gate settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// When false every request skips the health gate.
    pub enabled: bool,
    pub path: String,
    /// Cache time-to-live and monitoring period.
    pub check_interval_ms: u64,
    pub check_timeout_ms: u64,
}

impl HealthConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: DEFAULT_HEALTH_PATH.to_string(),
            check_interval_ms: DEFAULT_HEALTH_CHECK_INTERVAL_MS,
            check_timeout_ms: DEFAULT_HEALTH_CHECK_TIMEOUT_MS,
        }
    }
}

/// Shape of the delay curve between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// `delay_ms` every time.
    Fixed,
    /// `delay_ms` more per attempt.
    Linear,
    /// `delay_ms * backoff_factor^attempt`.
    #[default]
    Exponential,
}

/// Retry policy defaults for idempotent requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Additional attempts after the first failure.
    pub retries: u32,
    pub strategy: BackoffKind,
    pub delay_ms: u64,
    /// Multiplier applied per attempt; `1.0` gives a fixed delay.
    pub backoff_factor: f64,
    pub max_delay_ms: u64,
}

impl RetrySettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            strategy: BackoffKind::default(),
            delay_ms: DEFAULT_RETRY_DELAY_MS,
            backoff_factor: DEFAULT_RETRY_BACKOFF_FACTOR,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

/// Authentication settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub refresh_path: String,
    pub login_redirect_delay_ms: u64,
    /// Durable token slot; `None` keeps tokens in memory only.
    pub token_file: Option<PathBuf>,
}

impl AuthConfig {
    pub fn login_redirect_delay(&self) -> Duration {
        Duration::from_millis(self.login_redirect_delay_ms)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            login_redirect_delay_ms: DEFAULT_LOGIN_REDIRECT_DELAY_MS,
            token_file: None,
        }
    }
}

/// Realtime channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub ws_base_url: String,
    pub heartbeat_interval_ms: u64,
    pub should_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_factor: f64,
    pub reconnect_max_delay_ms: u64,
}

impl RealtimeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconnect_base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_base_url: DEFAULT_WS_BASE_URL.to_string(),
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            should_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay_ms: DEFAULT_RECONNECT_BASE_DELAY_MS,
            reconnect_factor: DEFAULT_RECONNECT_FACTOR,
            reconnect_max_delay_ms: DEFAULT_RECONNECT_MAX_DELAY_MS,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.health.enabled);
        assert_eq!(config.health.check_interval(), Duration::from_secs(30));
        assert_eq!(config.health.check_timeout(), Duration::from_secs(15));
        assert!(config.health.check_timeout() < config.api.timeout());
        assert_eq!(config.realtime.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"api":{"base_url":"https://rent.example.com/api/v1"}}"#)
                .unwrap();
        assert_eq!(config.api.base_url, "https://rent.example.com/api/v1");
        assert_eq!(config.api.timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        assert_eq!(config.retry, RetrySettings::default());
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.health.check_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            ApiError::Config("health.check_interval_ms must be greater than zero".to_string())
        );

        let mut config = Config::default();
        config.realtime.reconnect_factor = 0.0;
        assert!(matches!(config.validate(), Err(ApiError::Config(_))));

        let mut config = Config::default();
        config.retry.backoff_factor = f64::NAN;
        assert!(matches!(config.validate(), Err(ApiError::Config(_))));
    }

    #[test]
    fn test_validate_allows_disabled_heartbeat() {
        let mut config = Config::default();
        config.realtime.heartbeat_interval_ms = 0;
        assert!(config.validate().is_ok());
    }
}
