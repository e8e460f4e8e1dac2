//! Redis implementation of the Status Cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::cache::{StatusCache, cache_key};
use crate::config::{CacheConfig, RedisConfig};
use crate::error::CacheError;
use crate::job::{JobStatus, StatusReport};

/// Status cache backed by Redis string keys with a TTL.
#[derive(Clone)]
pub struct RedisStatusCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisStatusCache {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(redis: &RedisConfig, cache: &CacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis.url())?;
        let mut conn = ConnectionManager::new(client).await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self {
            conn,
            ttl: cache.ttl,
        })
    }

    /// Reuse an existing connection (the queue and cache share one Redis).
    pub fn with_connection(conn: ConnectionManager, cache: &CacheConfig) -> Self {
        Self {
            conn,
            ttl: cache.ttl,
        }
    }
}

#[async_trait]
impl StatusCache for RedisStatusCache {
    async fn get(&self, correlation_id: Uuid) -> Result<Option<StatusReport>, CacheError> {
        let mut conn = self.conn.clone();

        let raw: Option<Vec<u8>> = conn.get(cache_key(correlation_id)).await?;
        match raw {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, correlation_id: Uuid, status: JobStatus) -> Result<(), CacheError> {
        let entry = StatusReport {
            correlation_id,
            status,
        };
        let payload = serde_json::to_vec(&entry)?;
        let mut conn = self.conn.clone();

        // SET with EX spelled out; the cache contract is a plain bounded TTL.
        let _: () = redis::cmd("SET")
            .arg(cache_key(correlation_id))
            .arg(payload)
            .arg("EX")
            .arg(self.ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        Ok(())
    }
}
