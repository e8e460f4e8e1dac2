//! Job Processor: consumes the work queue and drives the job state machine.
//!
//! Transitions: `queued` → `in_progress` → `success` | `failed`, or back to
//! `queued` on a transient failure. `success` and `failed` are terminal.
//! Delivery is at-least-once, so every dequeued payload passes the store's
//! admission guard and atomic claim before any work happens; losers of the
//! claim race discard their delivery.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::watch;
use uuid::Uuid;

use crate::cache::StatusCache;
use crate::config::WorkerConfig;
use crate::error::StoreError;
use crate::executor::ActionExecutor;
use crate::job::{ExternalRef, JobStatus, QueueMessage};
use crate::queue::{WorkQueue, dead_letter_key, queue_key};
use crate::retry::{Disposition, classify};
use crate::store::JobStore;

/// What became of one dequeued payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Executor succeeded; job finalized `success`.
    Completed,
    /// Transient executor failure; job moved back to `queued` and the
    /// payload replayed at the front of its queue.
    Retried,
    /// Permanent failure; job finalized `failed`.
    Failed,
    /// Permanent failure of unknown shape; job finalized `failed` and the
    /// payload quarantined for manual review.
    Quarantined,
    /// Payload-level problem (undecodable bytes, store data error); payload
    /// quarantined, job row untouched.
    DeadLettered,
    /// Duplicate, lost claim race, or uncorrelatable delivery; dropped
    /// without any store write.
    Discarded,
    /// Store or queue connectivity problem; payload replayed when possible
    /// and the loop backs off before the next dequeue.
    InfraFailure,
}

/// One worker: a blocking-dequeue loop over a single execution domain.
///
/// Workers share nothing in-process; any number of them may run against the
/// same queue and store.
pub struct Worker {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    cache: Arc<dyn StatusCache>,
    executor: Arc<dyn ActionExecutor>,
    config: WorkerConfig,
    queue_name: String,
    dead_letter_name: String,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        cache: Arc<dyn StatusCache>,
        executor: Arc<dyn ActionExecutor>,
        config: WorkerConfig,
    ) -> Self {
        let queue_name = queue_key(&config.domain);
        let dead_letter_name = dead_letter_key(&config.domain);
        Self {
            store,
            queue,
            cache,
            executor,
            config,
            queue_name,
            dead_letter_name,
        }
    }

    /// Run the consume loop until `shutdown` flips to true.
    ///
    /// The in-flight message is always finished before the loop exits; the
    /// shutdown signal is only observed between dequeues.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            queue = %self.queue_name,
            "worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                dequeued = self
                    .queue
                    .dequeue_blocking(&self.queue_name, self.config.dequeue_timeout) =>
                {
                    match dequeued {
                        Ok(Some(payload)) => {
                            let outcome = self.process_payload(&payload).await;
                            tracing::debug!(outcome = ?outcome, "payload processed");
                            if outcome == Outcome::InfraFailure {
                                tokio::time::sleep(self.config.error_pause).await;
                            }
                        }
                        Ok(None) => {} // dequeue timeout, poll again
                        Err(e) => {
                            tracing::error!(
                                queue = %self.queue_name,
                                error = %e,
                                "dequeue failed, pausing before retry"
                            );
                            tokio::time::sleep(self.config.error_pause).await;
                        }
                    }
                }
            }
        }

        tracing::info!(queue = %self.queue_name, "worker stopped");
    }

    /// Drive one dequeued payload through the full state machine.
    ///
    /// Never returns an error: every failure mode maps to an [`Outcome`],
    /// and the loop only needs to know whether to back off.
    pub async fn process_payload(&self, payload: &[u8]) -> Outcome {
        // Undecodable bytes go to the dead-letter queue verbatim; there is
        // nothing to correlate and nothing in the store to update.
        let value: JsonValue = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "undecodable payload, quarantining");
                self.quarantine(payload).await;
                return Outcome::DeadLettered;
            }
        };

        // Decodable JSON without a usable correlation id cannot be tied to
        // any job row: drop it with a log line, the one no-store-write case.
        let correlation_id = match value
            .get("correlation_id")
            .and_then(JsonValue::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
        {
            Some(id) => id,
            None => {
                tracing::error!("payload has no usable correlation_id, discarding");
                return Outcome::Discarded;
            }
        };

        // Admission guard: at-least-once delivery means duplicates arrive.
        // Anything not sitting at exactly `queued` is a duplicate or an
        // unauthorized injection, and is dropped without a write.
        match self.store.validate_queued(correlation_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    "duplicate or invalid delivery, discarding"
                );
                return Outcome::Discarded;
            }
            Err(e) => return self.on_store_error(e, payload).await,
        }

        // Atomic claim: the conditional update admits exactly one worker.
        match self
            .store
            .try_claim(correlation_id, "Worker processing started.")
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    "job already claimed by another worker, discarding"
                );
                return Outcome::Discarded;
            }
            Err(e) => return self.on_store_error(e, payload).await,
        }
        self.write_cache(correlation_id, JobStatus::InProgress).await;

        // The claim is ours; a payload that decodes but is missing business
        // fields must still leave the job in a terminal, auditable state.
        let message: QueueMessage = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "payload incomplete, failing job"
                );
                return self
                    .finalize(
                        correlation_id,
                        JobStatus::Failed,
                        &format!("Malformed job payload: {e}"),
                        None,
                        payload,
                        Outcome::Failed,
                    )
                    .await;
            }
        };

        match self.executor.execute(&message).await {
            Ok(receipt) => {
                let external_ref = receipt.external_ref_id.map(|id| ExternalRef {
                    cloud_provider: message.target_cloud.clone(),
                    external_ref_id: id,
                });
                self.finalize(
                    correlation_id,
                    JobStatus::Success,
                    "Entitlement operation successful.",
                    external_ref.as_ref(),
                    payload,
                    Outcome::Completed,
                )
                .await
            }
            Err(err) => match classify(&err) {
                Disposition::Retry => {
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        error = %err,
                        "transient executor failure, re-queuing job"
                    );
                    let outcome = self
                        .finalize(
                            correlation_id,
                            JobStatus::Queued,
                            &format!("Transient failure, re-queuing job. Error: {err}"),
                            None,
                            payload,
                            Outcome::Retried,
                        )
                        .await;
                    if outcome != Outcome::Retried {
                        return outcome;
                    }
                    if let Err(e) = self
                        .queue
                        .enqueue_for_retry(&self.queue_name, payload)
                        .await
                    {
                        // The row is back at `queued` but the message is
                        // gone; the sweep command is the recovery path.
                        tracing::error!(
                            correlation_id = %correlation_id,
                            error = %e,
                            "replay failed after re-queue finalize"
                        );
                        return Outcome::InfraFailure;
                    }
                    Outcome::Retried
                }
                Disposition::Fail => {
                    tracing::error!(
                        correlation_id = %correlation_id,
                        error = %err,
                        "permanent executor failure, job will not be retried"
                    );
                    self.finalize(
                        correlation_id,
                        JobStatus::Failed,
                        &format!("Non-retryable failure: {err}"),
                        None,
                        payload,
                        Outcome::Failed,
                    )
                    .await
                }
                Disposition::FailAndQuarantine => {
                    tracing::error!(
                        correlation_id = %correlation_id,
                        error = %err,
                        "unhandled executor failure, quarantining for review"
                    );
                    let outcome = self
                        .finalize(
                            correlation_id,
                            JobStatus::Failed,
                            &format!("Unhandled failure, quarantined for review. Error: {err}"),
                            None,
                            payload,
                            Outcome::Quarantined,
                        )
                        .await;
                    if outcome != Outcome::Quarantined {
                        return outcome;
                    }
                    self.quarantine(payload).await;
                    Outcome::Quarantined
                }
            },
        }
    }

    /// Finalize with the worker-loop error policy applied: connectivity
    /// problems replay the message, data problems quarantine it.
    async fn finalize(
        &self,
        correlation_id: Uuid,
        status: JobStatus,
        audit_message: &str,
        external_ref: Option<&ExternalRef>,
        payload: &[u8],
        on_ok: Outcome,
    ) -> Outcome {
        match self
            .store
            .finalize(correlation_id, status, audit_message, external_ref)
            .await
        {
            Ok(()) => {
                self.write_cache(correlation_id, status).await;
                on_ok
            }
            Err(e) => self.on_store_error(e, payload).await,
        }
    }

    /// Worker-loop policy for store failures (never the classifier's job):
    /// transient ⇒ replay the message and back off, permanent ⇒ dead-letter
    /// the message and leave the store alone.
    async fn on_store_error(&self, err: StoreError, payload: &[u8]) -> Outcome {
        if err.is_transient() {
            tracing::error!(error = %err, "store connectivity failure, replaying message");
            if let Err(e) = self
                .queue
                .enqueue_for_retry(&self.queue_name, payload)
                .await
            {
                tracing::error!(error = %e, "replay failed, message may be lost");
            }
            Outcome::InfraFailure
        } else {
            tracing::error!(error = %err, "store rejected operation, quarantining message");
            self.quarantine(payload).await;
            Outcome::DeadLettered
        }
    }

    async fn quarantine(&self, payload: &[u8]) {
        if let Err(e) = self.queue.dead_letter(&self.dead_letter_name, payload).await {
            tracing::error!(
                queue = %self.dead_letter_name,
                error = %e,
                "dead-letter push failed, payload dropped"
            );
        }
    }

    /// Best-effort write-through; the store row stays the source of truth.
    async fn write_cache(&self, correlation_id: Uuid, status: JobStatus) {
        if let Err(e) = self.cache.put(correlation_id, status).await {
            tracing::warn!(
                correlation_id = %correlation_id,
                error = %e,
                "status cache write failed"
            );
        }
    }
}
