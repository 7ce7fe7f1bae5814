//! Gateway configuration loaded from environment variables.
//!
//! All configuration is loaded from environment variables with sensible
//! defaults for development. A `.env` file in the working directory is
//! honored if present.
//!
//! # Security Configuration
//!
//! - `JWT_SECRET`: HMAC signing secret for bearer tokens. Required (and at
//!   least 32 bytes) whenever any route requires authentication.
//! - `CORS_ALLOWED_ORIGIN`: Value of `Access-Control-Allow-Origin` (default: `*`)
//! - `CORS_LOCAL_OVERRIDE` / `LOCAL_HOSTS`: Rewrite 403s and swallow
//!   downstream failures for callers addressing the gateway by a trusted
//!   local host name (default: enabled, `localhost,127.0.0.1`)
//!
//! # Upstreams
//!
//! - `GATEWAY_ROUTES`: JSON route list replacing the built-in table
//! - `UPSTREAM_TIMEOUT_SECS`: Per-request upstream timeout (default: 30)
//! - `CIRCUIT_BREAKER_*`: Per-route breaker thresholds

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::auth::MIN_SECRET_BYTES;
use crate::error::{GatewayError, GatewayResult};
use crate::routes::RouteConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty or json)")),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    /// Maximum accepted request body in bytes (default: 10MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Authentication
    // =========================================================================
    /// Token signing secret. Never logged.
    pub jwt_secret: Option<SecretString>,

    // =========================================================================
    // Routing & upstreams
    // =========================================================================
    pub routes: Vec<RouteConfig>,

    pub upstream_timeout: Duration,

    pub circuit_breaker_failure_threshold: u32,
    pub circuit_breaker_success_threshold: u32,
    pub circuit_breaker_open_duration: Duration,

    // =========================================================================
    // CORS
    // =========================================================================
    pub cors_allowed_origin: String,

    /// Whether trusted-local callers get the 403/failure override.
    pub cors_local_override: bool,

    /// Host names treated as trusted-local (compared case-insensitively).
    pub local_hosts: Vec<String>,

    // =========================================================================
    // Observability
    // =========================================================================
    /// Log output format; the filter itself comes from `RUST_LOG`.
    ///
    /// The subscriber is installed before configuration loads so that config
    /// errors are logged too; it reads `LOG_FORMAT` itself and falls back to
    /// pretty output. This field is the validated copy: an unknown format
    /// still fails `from_env`.
    pub log_format: LogFormat,

    /// Prometheus exporter port, 0 disables it (default: 9090)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ConfigError` if any value fails to parse or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> GatewayResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let routes = match env::var("GATEWAY_ROUTES") {
            Ok(json) if !json.trim().is_empty() => RouteConfig::parse_list(&json)?,
            _ => RouteConfig::defaults(),
        };

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8080)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 10 * 1024 * 1024)?,

            jwt_secret: env::var("JWT_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .map(SecretString::from),

            routes,
            upstream_timeout: Duration::from_secs(Self::parse_env("UPSTREAM_TIMEOUT_SECS", 30)?),
            circuit_breaker_failure_threshold: Self::parse_env(
                "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                5,
            )?,
            circuit_breaker_success_threshold: Self::parse_env(
                "CIRCUIT_BREAKER_SUCCESS_THRESHOLD",
                2,
            )?,
            circuit_breaker_open_duration: Duration::from_secs(Self::parse_env(
                "CIRCUIT_BREAKER_OPEN_DURATION_SECS",
                30,
            )?),

            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "*".to_string()),
            cors_local_override: Self::parse_env("CORS_LOCAL_OVERRIDE", true)?,
            local_hosts: Self::parse_list("LOCAL_HOSTS", "localhost,127.0.0.1"),

            log_format: Self::parse_env("LOG_FORMAT", LogFormat::Pretty)?,
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.routes.iter().any(|r| r.auth_required) {
            match &self.jwt_secret {
                None => {
                    return Err(GatewayError::ConfigError(
                        "JWT_SECRET is required when any route requires authentication"
                            .to_string(),
                    ));
                }
                Some(secret) if secret.expose_secret().len() < MIN_SECRET_BYTES => {
                    return Err(GatewayError::ConfigError(format!(
                        "JWT_SECRET must be at least {MIN_SECRET_BYTES} bytes"
                    )));
                }
                Some(_) => {}
            }
        }

        if self.upstream_timeout.is_zero() {
            return Err(GatewayError::ConfigError(
                "UPSTREAM_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(GatewayError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.circuit_breaker_failure_threshold == 0
            || self.circuit_breaker_success_threshold == 0
        {
            return Err(GatewayError::ConfigError(
                "Circuit breaker thresholds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address, `None` if metrics are disabled.
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_enabled()
            .then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> GatewayResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| GatewayError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, dropping empty entries.
    fn parse_list(name: &str, default: &str) -> Vec<String> {
        env::var(name)
            .unwrap_or_else(|_| default.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead. The
/// default has no `jwt_secret`, so it only validates once one is set.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_request_body_size: 10 * 1024 * 1024, // 10MB
            jwt_secret: None,
            routes: RouteConfig::defaults(),
            upstream_timeout: Duration::from_secs(30),
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_success_threshold: 2,
            circuit_breaker_open_duration: Duration::from_secs(30),
            cors_allowed_origin: "*".to_string(),
            cors_local_override: true,
            local_hosts: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            log_format: LogFormat::Pretty,
            metrics_port: 9090,
        }
    }
}
