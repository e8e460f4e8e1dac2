//! Work Queue: durable, at-least-once delivery of job payloads.
//!
//! One ordered queue per execution domain, plus one dead-letter queue per
//! domain for messages that must not be retried automatically. The queue
//! performs no deduplication; duplicate deliveries are filtered by the Job
//! Store's claim protocol.

mod redis;

pub use redis::RedisWorkQueue;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::job::QueueMessage;

/// Name of the work queue for an execution domain.
pub fn queue_key(domain: &str) -> String {
    format!("queue:{domain}")
}

/// Name of the dead-letter queue for an execution domain.
pub fn dead_letter_key(domain: &str) -> String {
    format!("queue:{domain}_error")
}

/// Queue contract: multi-producer, multi-consumer, at-least-once.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Push a fresh submission to the back of the line.
    async fn enqueue(&self, queue: &str, message: &QueueMessage) -> Result<(), QueueError>;

    /// Replay a payload verbatim at the front of the line, so retried work
    /// is delivered ahead of fresh arrivals.
    async fn enqueue_for_retry(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError>;

    /// Block until a message arrives or the timeout elapses.
    ///
    /// Returns raw bytes: the payload may be malformed, and classifying that
    /// is the consumer's job.
    async fn dequeue_blocking(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, QueueError>;

    /// Quarantine a payload verbatim on the named dead-letter queue.
    async fn dead_letter(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_keys_follow_the_domain_convention() {
        assert_eq!(queue_key("aws"), "queue:aws");
        assert_eq!(dead_letter_key("aws"), "queue:aws_error");
        assert_eq!(queue_key("gcp"), "queue:gcp");
        assert_eq!(dead_letter_key("gcp"), "queue:gcp_error");
    }
}
