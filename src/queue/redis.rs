//! Redis-list implementation of the Work Queue.
//!
//! Consumers pop with BRPOP from the right end of the list. Fresh
//! submissions LPUSH onto the left end (back of the line); retries RPUSH
//! onto the right end, making them the next delivery.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::config::RedisConfig;
use crate::error::QueueError;
use crate::job::QueueMessage;
use crate::queue::WorkQueue;

/// Work queue backed by Redis lists.
#[derive(Clone)]
pub struct RedisWorkQueue {
    conn: ConnectionManager,
}

impl RedisWorkQueue {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(config: &RedisConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.url())?;
        let mut conn = ConnectionManager::new(client).await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self { conn })
    }

    /// Clone of the underlying connection, for components sharing one Redis.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn enqueue(&self, queue: &str, message: &QueueMessage) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(message)?;
        let mut conn = self.conn.clone();

        let _: () = conn.lpush(queue, payload).await?;
        tracing::debug!(queue, correlation_id = %message.correlation_id, "enqueued job");
        Ok(())
    }

    async fn enqueue_for_retry(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();

        let _: () = conn.rpush(queue, payload).await?;
        tracing::debug!(queue, "replayed payload at the front of the queue");
        Ok(())
    }

    async fn dequeue_blocking(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, QueueError> {
        let mut conn = self.conn.clone();

        let item: Option<(String, Vec<u8>)> = conn.brpop(queue, timeout.as_secs_f64()).await?;

        Ok(item.map(|(_, payload)| payload))
    }

    async fn dead_letter(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();

        let _: () = conn.lpush(queue, payload).await?;
        tracing::warn!(queue, "payload moved to dead-letter queue");
        Ok(())
    }
}
