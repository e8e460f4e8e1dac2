//! Job Store: relational source of truth for job state and audit history.
//!
//! The store owns the `Job` row exclusively. Queue messages and cache
//! entries are derived copies; any disagreement is resolved in the store's
//! favor.

mod postgres;

pub use postgres::PgJobStore;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::{AuditEntry, ExternalRef, JobStatus, NewJob, QueueMessage, StatusReport};

/// Durable storage contract for the job lifecycle.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert the job row and its first audit entry in one atomic unit.
    /// No partial job record is ever visible.
    async fn create_job(&self, job: &NewJob) -> Result<(), StoreError>;

    /// True iff the job exists and its status is exactly `queued`.
    ///
    /// Cheap admission pre-check for duplicate deliveries; [`try_claim`]
    /// remains the authoritative gate.
    ///
    /// [`try_claim`]: JobStore::try_claim
    async fn validate_queued(&self, correlation_id: Uuid) -> Result<bool, StoreError>;

    /// Atomically claim a queued job for processing.
    ///
    /// A single conditional update (`status = 'in_progress' WHERE status =
    /// 'queued'`) plus the audit row, in one transaction. Exactly one of any
    /// set of concurrent callers wins; the rest see `false` and must discard
    /// their delivery.
    async fn try_claim(
        &self,
        correlation_id: Uuid,
        audit_message: &str,
    ) -> Result<bool, StoreError>;

    /// Move a job to `new_status`, appending one audit row, all in one
    /// atomic unit. The external reference row is written only when
    /// `new_status` is `Success` and a reference is supplied.
    async fn finalize(
        &self,
        correlation_id: Uuid,
        new_status: JobStatus,
        audit_message: &str,
        external_ref: Option<&ExternalRef>,
    ) -> Result<(), StoreError>;

    /// Status-reporting subset for a job, or `None` if unknown.
    async fn get_status(&self, correlation_id: Uuid) -> Result<Option<StatusReport>, StoreError>;

    /// Full transition history for a job, oldest first.
    async fn audit_trail(&self, correlation_id: Uuid) -> Result<Vec<AuditEntry>, StoreError>;

    /// Flip `in_progress` jobs untouched for longer than `older_than` back to
    /// `queued` and return rebuilt queue messages for re-enqueueing.
    ///
    /// Recovery path for workers that died between claim and finalize.
    async fn release_stuck(&self, older_than: Duration)
    -> Result<Vec<QueueMessage>, StoreError>;
}
