//! Ingestion backend: records a change request durably and makes it
//! available to workers.
//!
//! The HTTP surface (parsing, schema validation, auth, rate limiting) lives
//! outside this crate; whatever hosts it calls [`Gateway::submit`] and
//! [`Gateway::status`].

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::cache::StatusCache;
use crate::error::Error;
use crate::job::{EntitlementType, JobAction, JobStatus, NewJob, PrincipalType, StatusReport};
use crate::queue::{WorkQueue, queue_key};
use crate::store::JobStore;

/// A change request as accepted at the ingestion boundary.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub client_request_id: String,
    pub account_id: String,
    pub principal: String,
    pub principal_type: PrincipalType,
    pub entitlement: String,
    pub entitlement_type: EntitlementType,
    pub action: JobAction,
    pub target_cloud: String,
}

/// Submission and status-lookup entry point.
pub struct Gateway {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    cache: Arc<dyn StatusCache>,
}

impl Gateway {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        cache: Arc<dyn StatusCache>,
    ) -> Self {
        Self {
            store,
            queue,
            cache,
        }
    }

    /// Accept a change request: record it (job row + first audit row, one
    /// atomic unit), enqueue it for the target domain, and prime the status
    /// cache. Returns the assigned correlation id.
    ///
    /// Store and queue failures propagate; a cache failure never does.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Uuid, Error> {
        let job = NewJob {
            correlation_id: Uuid::new_v4(),
            client_request_id: request.client_request_id,
            account_id: request.account_id,
            principal: request.principal,
            principal_type: request.principal_type,
            entitlement: request.entitlement,
            entitlement_type: request.entitlement_type,
            action: request.action,
            cloud_provider: request.target_cloud,
            received_at: Utc::now(),
        };

        self.store.create_job(&job).await?;

        let message = job.to_queue_message();
        self.queue
            .enqueue(&queue_key(&job.cloud_provider), &message)
            .await?;

        if let Err(e) = self.cache.put(job.correlation_id, JobStatus::Queued).await {
            tracing::warn!(
                correlation_id = %job.correlation_id,
                error = %e,
                "status cache write failed after submit"
            );
        }

        tracing::info!(
            correlation_id = %job.correlation_id,
            target_cloud = %job.cloud_provider,
            action = %job.action,
            "change request accepted"
        );
        Ok(job.correlation_id)
    }

    /// Cache-aside status lookup: cache hit returns without touching the
    /// store; miss (or cache failure) falls back to the store and
    /// repopulates the cache.
    pub async fn status(&self, correlation_id: Uuid) -> Result<Option<StatusReport>, Error> {
        match self.cache.get(correlation_id).await {
            Ok(Some(report)) => {
                tracing::debug!(correlation_id = %correlation_id, "status served from cache");
                return Ok(Some(report));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "status cache read failed, falling back to store"
                );
            }
        }

        let report = self.store.get_status(correlation_id).await?;

        if let Some(report) = &report {
            if let Err(e) = self.cache.put(correlation_id, report.status).await {
                tracing::warn!(
                    correlation_id = %correlation_id,
                    error = %e,
                    "status cache repopulation failed"
                );
            }
        }

        Ok(report)
    }
}
