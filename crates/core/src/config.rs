//! Shared configuration loader for the catalog services
//!
//! Configuration is read from environment variables carrying the `CATALOG_`
//! prefix, optionally seeded from a `.env` file. Every config type offers
//! typed defaults for optional values and a `validate()` pass that rejects
//! unusable settings at startup.
//!
//! # Example
//!
//! ```no_run
//! use vod_catalog_core::config::{load_dotenv, ConfigLoader, ServiceConfig};
//!
//! # fn example() -> Result<(), vod_catalog_core::CoreError> {
//! load_dotenv();
//! let service = ServiceConfig::from_env()?;
//! service.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::CoreError;
use crate::observability::LogFormat;
use std::time::Duration;
use url::Url;

/// Configuration loader trait
///
/// Provides standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if a required variable is missing or a
    /// value cannot be parsed.
    fn from_env() -> Result<Self, CoreError>;

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns a `ConfigurationError` if any validation check fails.
    fn validate(&self) -> Result<(), CoreError>;
}

/// Database configuration
///
/// # Environment Variables
///
/// - `CATALOG_DATABASE_URL` or `DATABASE_URL`: PostgreSQL connection URL
/// - `CATALOG_DATABASE_MAX_CONNECTIONS` (optional): Maximum pool connections (default: 10)
/// - `CATALOG_DATABASE_MIN_CONNECTIONS` (optional): Minimum pool connections (default: 1)
/// - `CATALOG_DATABASE_CONNECT_TIMEOUT` (optional): Connection timeout in seconds (default: 30)
/// - `CATALOG_DATABASE_IDLE_TIMEOUT` (optional): Idle connection timeout in seconds (default: 600)
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Idle connection timeout duration
    pub idle_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/vod_catalog".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl DatabaseConfig {
    /// Load the database configuration only when a URL is configured
    ///
    /// The durable store is optional; callers fall back to an in-memory store
    /// when this returns `Ok(None)`.
    pub fn from_env_if_present() -> Result<Option<Self>, CoreError> {
        if env_value(&["CATALOG_DATABASE_URL", "DATABASE_URL"]).is_none() {
            return Ok(None);
        }
        Self::from_env().map(Some)
    }
}

impl ConfigLoader for DatabaseConfig {
    fn from_env() -> Result<Self, CoreError> {
        let url = env_value(&["CATALOG_DATABASE_URL", "DATABASE_URL"]).ok_or_else(|| {
            CoreError::config(
                "DATABASE_URL or CATALOG_DATABASE_URL must be set",
                "CATALOG_DATABASE_URL",
            )
        })?;

        let defaults = DatabaseConfig::default();
        let max_connections =
            parse_env_var("CATALOG_DATABASE_MAX_CONNECTIONS", defaults.max_connections)?;
        let min_connections =
            parse_env_var("CATALOG_DATABASE_MIN_CONNECTIONS", defaults.min_connections)?;
        let connect_timeout_secs = parse_env_var("CATALOG_DATABASE_CONNECT_TIMEOUT", 30u64)?;
        let idle_timeout_secs = parse_env_var("CATALOG_DATABASE_IDLE_TIMEOUT", 600u64)?;

        Ok(Self {
            url,
            max_connections,
            min_connections,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        Url::parse(&self.url).map_err(|e| {
            CoreError::config(
                format!("Invalid DATABASE_URL: {}", e),
                "CATALOG_DATABASE_URL",
            )
        })?;

        if self.max_connections == 0 {
            return Err(CoreError::config(
                "max_connections must be greater than 0",
                "CATALOG_DATABASE_MAX_CONNECTIONS",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(CoreError::config(
                format!(
                    "min_connections ({}) cannot exceed max_connections ({})",
                    self.min_connections, self.max_connections
                ),
                "CATALOG_DATABASE_MIN_CONNECTIONS",
            ));
        }

        if self.connect_timeout.as_secs() == 0 {
            return Err(CoreError::config(
                "connect_timeout must be greater than 0 seconds",
                "CATALOG_DATABASE_CONNECT_TIMEOUT",
            ));
        }

        Ok(())
    }
}

/// Redis configuration for the distributed cache tier
///
/// # Environment Variables
///
/// - `CATALOG_REDIS_URL` or `REDIS_URL`: Redis connection URL
/// - `CATALOG_REDIS_CONNECTION_TIMEOUT` (optional): Connection timeout in seconds (default: 5)
/// - `CATALOG_REDIS_RESPONSE_TIMEOUT` (optional): Per-command timeout in milliseconds (default: 500)
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Connection timeout duration
    pub connection_timeout: Duration,
    /// Per-command response timeout
    pub response_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379/0".to_string(),
            connection_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_millis(500),
        }
    }
}

impl RedisConfig {
    /// Load the Redis configuration only when a URL is configured
    pub fn from_env_if_present() -> Result<Option<Self>, CoreError> {
        if env_value(&["CATALOG_REDIS_URL", "REDIS_URL"]).is_none() {
            return Ok(None);
        }
        Self::from_env().map(Some)
    }
}

impl ConfigLoader for RedisConfig {
    fn from_env() -> Result<Self, CoreError> {
        let url = env_value(&["CATALOG_REDIS_URL", "REDIS_URL"]).ok_or_else(|| {
            CoreError::config(
                "REDIS_URL or CATALOG_REDIS_URL must be set",
                "CATALOG_REDIS_URL",
            )
        })?;

        let connection_timeout_secs = parse_env_var("CATALOG_REDIS_CONNECTION_TIMEOUT", 5u64)?;
        let response_timeout_ms = parse_env_var("CATALOG_REDIS_RESPONSE_TIMEOUT", 500u64)?;

        Ok(Self {
            url,
            connection_timeout: Duration::from_secs(connection_timeout_secs),
            response_timeout: Duration::from_millis(response_timeout_ms),
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        Url::parse(&self.url).map_err(|e| {
            CoreError::config(format!("Invalid REDIS_URL: {}", e), "CATALOG_REDIS_URL")
        })?;

        if self.connection_timeout.is_zero() {
            return Err(CoreError::config(
                "connection_timeout must be greater than 0 seconds",
                "CATALOG_REDIS_CONNECTION_TIMEOUT",
            ));
        }

        if self.response_timeout.is_zero() {
            return Err(CoreError::config(
                "response_timeout must be greater than 0 milliseconds",
                "CATALOG_REDIS_RESPONSE_TIMEOUT",
            ));
        }

        Ok(())
    }
}

/// Service configuration
///
/// # Environment Variables
///
/// - `CATALOG_SERVICE_HOST` (optional): Service bind host (default: "0.0.0.0")
/// - `CATALOG_SERVICE_PORT` or `PORT` (optional): Service bind port (default: 8085)
/// - `CATALOG_SERVICE_LOG_LEVEL` or `RUST_LOG` (optional): Log level (default: "info")
/// - `CATALOG_SERVICE_LOG_FORMAT` (optional): `json` or `pretty` (default: "json")
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service bind host
    pub host: String,
    /// Service bind port
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8085,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl ConfigLoader for ServiceConfig {
    fn from_env() -> Result<Self, CoreError> {
        let defaults = ServiceConfig::default();

        let host = std::env::var("CATALOG_SERVICE_HOST").unwrap_or(defaults.host);

        let port = match std::env::var("CATALOG_SERVICE_PORT") {
            Ok(_) => parse_env_var("CATALOG_SERVICE_PORT", defaults.port)?,
            Err(_) => parse_env_var("PORT", defaults.port)?,
        };

        let log_level = env_value(&["CATALOG_SERVICE_LOG_LEVEL", "RUST_LOG"])
            .unwrap_or(defaults.log_level);

        let log_format = parse_env_var("CATALOG_SERVICE_LOG_FORMAT", defaults.log_format)?;

        Ok(Self {
            host,
            port,
            log_level,
            log_format,
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.port == 0 {
            return Err(CoreError::config(
                "port must be greater than 0",
                "CATALOG_SERVICE_PORT",
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(CoreError::config(
                format!(
                    "Invalid log_level '{}'. Must be one of: {}",
                    self.log_level,
                    valid_log_levels.join(", ")
                ),
                "CATALOG_SERVICE_LOG_LEVEL",
            ));
        }

        Ok(())
    }
}

/// Parse an environment variable, falling back to `default` when unset
///
/// # Errors
///
/// Returns a `ConfigurationError` if the variable is set but cannot be parsed
pub fn parse_env_var<T>(key: &str, default: T) -> Result<T, CoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| CoreError::config(format!("Failed to parse {}: {}", key, e), key))
        })
        .unwrap_or(Ok(default))
}

/// First non-empty value among the given environment keys
pub fn env_value(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Load .env file if present
///
/// A missing file is not an error.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    /// Environment variables are process-global; tests touching them take this lock.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_database_config_from_env() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("CATALOG_DATABASE_URL", "postgresql://localhost/test");
        env::set_var("CATALOG_DATABASE_MAX_CONNECTIONS", "50");

        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.url, "postgresql://localhost/test");
        assert_eq!(config.max_connections, 50);

        clear(&["CATALOG_DATABASE_URL", "CATALOG_DATABASE_MAX_CONNECTIONS"]);
    }

    #[test]
    fn test_database_config_optional_when_absent() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear(&["CATALOG_DATABASE_URL", "DATABASE_URL"]);

        assert!(DatabaseConfig::from_env_if_present().unwrap().is_none());
    }

    #[test]
    fn test_database_url_fallback() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear(&["CATALOG_DATABASE_URL"]);
        env::set_var("DATABASE_URL", "postgresql://fallback/test");

        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.url, "postgresql://fallback/test");

        clear(&["DATABASE_URL"]);
    }

    #[test]
    fn test_database_config_validation_min_exceeds_max() {
        let config = DatabaseConfig {
            min_connections: 30,
            max_connections: 20,
            ..DatabaseConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_config_validation_invalid_url() {
        let config = DatabaseConfig {
            url: "not-a-valid-url".to_string(),
            ..DatabaseConfig::default()
        };

        assert!(matches!(
            config.validate().unwrap_err(),
            CoreError::ConfigurationError { .. }
        ));
    }

    #[test]
    fn test_redis_config_from_env() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("CATALOG_REDIS_URL", "redis://localhost:6379/1");
        env::set_var("CATALOG_REDIS_RESPONSE_TIMEOUT", "250");

        let config = RedisConfig::from_env().unwrap();
        assert_eq!(config.url, "redis://localhost:6379/1");
        assert_eq!(config.response_timeout, Duration::from_millis(250));

        clear(&["CATALOG_REDIS_URL", "CATALOG_REDIS_RESPONSE_TIMEOUT"]);
    }

    #[test]
    fn test_redis_config_validation_invalid_url() {
        let config = RedisConfig {
            url: "invalid-redis-url".to_string(),
            ..RedisConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_service_config_validation_invalid_log_level() {
        let config = ServiceConfig {
            log_level: "loud".to_string(),
            ..ServiceConfig::default()
        };

        match config.validate().unwrap_err() {
            CoreError::ConfigurationError { message, .. } => {
                assert!(message.contains("Invalid log_level"));
            }
            other => panic!("Expected ConfigurationError, got {:?}", other),
        }
    }

    #[test]
    fn test_service_config_log_format_from_env() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("CATALOG_SERVICE_LOG_FORMAT", "pretty");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.log_format, LogFormat::Pretty);

        clear(&["CATALOG_SERVICE_LOG_FORMAT"]);
    }

    #[test]
    fn test_parse_env_var_with_default() {
        let result: u32 = parse_env_var("CATALOG_TEST_NON_EXISTENT_VAR", 42).unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn test_parse_env_var_invalid_value() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        env::set_var("CATALOG_TEST_INVALID_VAR", "not-a-number");

        let result: Result<u32, _> = parse_env_var("CATALOG_TEST_INVALID_VAR", 42);
        assert!(result.is_err());

        clear(&["CATALOG_TEST_INVALID_VAR"]);
    }
}
