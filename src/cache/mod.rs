//! Status Cache: best-effort, bounded-staleness view of job status.
//!
//! Entries are read-through/write-through projections of the Job Store row
//! and are never authoritative. Every caller absorbs cache failures: a
//! missing or stale entry only costs one extra store read.

mod redis;

pub use redis::RedisStatusCache;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::CacheError;
use crate::job::{JobStatus, StatusReport};

/// Cache key for a job's status entry.
pub fn cache_key(correlation_id: Uuid) -> String {
    format!("cache:status:{correlation_id}")
}

/// Best-effort cache over the status-query contract.
#[async_trait]
pub trait StatusCache: Send + Sync {
    /// Look up a cached status entry, `None` on miss.
    async fn get(&self, correlation_id: Uuid) -> Result<Option<StatusReport>, CacheError>;

    /// Write a status entry with the configured TTL.
    async fn put(&self, correlation_id: Uuid, status: JobStatus) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_follows_the_status_convention() {
        let id = Uuid::nil();
        assert_eq!(
            cache_key(id),
            "cache:status:00000000-0000-0000-0000-000000000000"
        );
    }
}
