//! Configuration for entbridge.
//!
//! Everything is resolved once from environment variables at startup and
//! passed into components as an immutable value. No component reads the
//! environment after construction.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Main configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            database: DatabaseConfig::from_env()?,
            redis: RedisConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            worker: WorkerConfig::from_env()?,
        })
    }
}

/// Job Store (PostgreSQL) configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: SecretString,
    pub pool_size: usize,
}

impl DatabaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = require_env("DATABASE_URL")?;
        let pool_size = parse_optional_env("DATABASE_POOL_SIZE", 8)?;

        Ok(Self {
            url: SecretString::from(url),
            pool_size,
        })
    }

    pub fn url(&self) -> &str {
        self.url.expose_secret()
    }
}

/// Work Queue / Status Cache (Redis) configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: SecretString,
}

impl RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = require_env("REDIS_URL")?;
        Ok(Self {
            url: SecretString::from(url),
        })
    }

    pub fn url(&self) -> &str {
        self.url.expose_secret()
    }
}

/// Status cache tuning.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Bounded staleness for cached status entries.
    pub ttl: Duration,
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let ttl_secs: u64 = parse_optional_env("CACHE_TTL_SECS", 300)?;
        Ok(Self {
            ttl: Duration::from_secs(ttl_secs),
        })
    }
}

/// Worker loop tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Execution domain this worker consumes (`queue:{domain}`).
    pub domain: String,
    /// How long a single blocking dequeue waits before re-polling.
    pub dequeue_timeout: Duration,
    /// Pause after a loop-level connectivity failure, to avoid hot-looping
    /// against a dead backend.
    pub error_pause: Duration,
    /// Age past which an `in_progress` job is considered abandoned by the
    /// `sweep` command.
    pub stuck_after: Duration,
}

impl WorkerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let domain = optional_env("WORKER_DOMAIN")?.unwrap_or_else(|| "aws".to_string());
        let dequeue_timeout_secs: u64 = parse_optional_env("WORKER_DEQUEUE_TIMEOUT_SECS", 5)?;
        let error_pause_secs: u64 = parse_optional_env("WORKER_ERROR_PAUSE_SECS", 10)?;
        let stuck_after_secs: u64 = parse_optional_env("WORKER_STUCK_AFTER_SECS", 900)?;

        Ok(Self {
            domain,
            dequeue_timeout: Duration::from_secs(dequeue_timeout_secs),
            error_pause: Duration::from_secs(error_pause_secs),
            stuck_after: Duration::from_secs(stuck_after_secs),
        })
    }
}

// Helper functions

pub(crate) fn require_env(key: &str) -> Result<String, ConfigError> {
    optional_env(key)?.ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!(
            "failed to read {key}: {e}"
        ))),
    }
}

pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global, so serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn optional_env_returns_none_for_missing_var() {
        let _lock = ENV_LOCK.lock();
        unsafe { std::env::remove_var("_ENTBRIDGE_TEST_MISSING") };
        assert!(optional_env("_ENTBRIDGE_TEST_MISSING").unwrap().is_none());
    }

    #[test]
    fn optional_env_treats_empty_as_unset() {
        let _lock = ENV_LOCK.lock();
        unsafe { std::env::set_var("_ENTBRIDGE_TEST_EMPTY", "") };
        assert!(optional_env("_ENTBRIDGE_TEST_EMPTY").unwrap().is_none());
        unsafe { std::env::remove_var("_ENTBRIDGE_TEST_EMPTY") };
    }

    #[test]
    fn require_env_errors_when_missing() {
        let _lock = ENV_LOCK.lock();
        unsafe { std::env::remove_var("_ENTBRIDGE_TEST_REQUIRED") };
        let err = require_env("_ENTBRIDGE_TEST_REQUIRED").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn parse_optional_env_returns_default_when_missing() {
        let _lock = ENV_LOCK.lock();
        unsafe { std::env::remove_var("_ENTBRIDGE_TEST_PARSE_MISSING") };
        let result: u64 = parse_optional_env("_ENTBRIDGE_TEST_PARSE_MISSING", 300).unwrap();
        assert_eq!(result, 300);
    }

    #[test]
    fn parse_optional_env_parses_value() {
        let _lock = ENV_LOCK.lock();
        unsafe { std::env::set_var("_ENTBRIDGE_TEST_PARSE_VAL", "42") };
        let result: u64 = parse_optional_env("_ENTBRIDGE_TEST_PARSE_VAL", 0).unwrap();
        assert_eq!(result, 42);
        unsafe { std::env::remove_var("_ENTBRIDGE_TEST_PARSE_VAL") };
    }

    #[test]
    fn parse_optional_env_rejects_invalid_value() {
        let _lock = ENV_LOCK.lock();
        unsafe { std::env::set_var("_ENTBRIDGE_TEST_PARSE_BAD", "not_a_number") };
        let result: Result<u64, _> = parse_optional_env("_ENTBRIDGE_TEST_PARSE_BAD", 0);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
        unsafe { std::env::remove_var("_ENTBRIDGE_TEST_PARSE_BAD") };
    }
}
