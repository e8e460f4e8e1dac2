//! Error types for entbridge.
//!
//! Retryability is part of the type, not a convention: every failure a caller
//! can see either carries an `is_transient` answer or belongs to a taxonomy
//! whose disposition is decided exhaustively in [`crate::retry`].

/// Top-level error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Job Store failures.
///
/// `Pool` and `Connectivity` mean the store could not be reached and the same
/// operation may succeed if repeated; `Query` means the statement itself was
/// rejected (permissions, constraints, bad data) and repeating it cannot help.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Store connectivity error: {0}")]
    Connectivity(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl StoreError {
    /// Whether repeating the same operation can possibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Connectivity(_))
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        // SQLSTATE class 08 is "connection exception"; errors without any
        // SQLSTATE never reached the server (socket or protocol failures).
        match e.code() {
            Some(state) if !state.code().starts_with("08") => Self::Query(e.to_string()),
            _ => Self::Connectivity(e.to_string()),
        }
    }
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}

/// Work Queue failures. Connectivity is the only failure mode the queue
/// service itself can produce, and it is always worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue connectivity error: {0}")]
    Connection(String),

    #[error("Message serialization failed: {0}")]
    Serialization(String),
}

impl QueueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        Self::Connection(e.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Status Cache failures. Never authoritative: callers log these and move on.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache operation failed: {0}")]
    Operation(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        Self::Operation(e.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        Self::Operation(e.to_string())
    }
}

/// Action Executor failures, tagged with the provider-visible cause.
///
/// The worker never matches on these directly; [`crate::retry::classify`]
/// maps each variant to a disposition.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Provider throttled the request: {0}")]
    Throttled(String),

    #[error("Transient network failure: {0}")]
    Network(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Job payload missing required data: {0}")]
    Payload(String),

    #[error("Unhandled executor failure: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_and_connectivity_are_transient() {
        assert!(StoreError::Pool("timed out".into()).is_transient());
        assert!(StoreError::Connectivity("connection reset".into()).is_transient());
        assert!(!StoreError::Query("permission denied".into()).is_transient());
        assert!(!StoreError::Migration("bad version".into()).is_transient());
    }

    #[test]
    fn queue_connection_errors_are_transient() {
        assert!(QueueError::Connection("refused".into()).is_transient());
        assert!(!QueueError::Serialization("bad json".into()).is_transient());
    }
}
