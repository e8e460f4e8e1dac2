//! Action Executor seam: the external service that performs the privileged
//! entitlement operation.
//!
//! The executor's internals are opaque to the pipeline; only its
//! success/failure contract matters. Failures come back as
//! [`ExecutorError`] variants, which [`crate::retry::classify`] turns into a
//! disposition.

use async_trait::async_trait;

use crate::error::ExecutorError;
use crate::job::QueueMessage;

/// Outcome of a successful execution.
#[derive(Debug, Clone)]
pub struct ExecutionReceipt {
    /// Opaque provider-side identifier for external audit correlation,
    /// when the provider returned one.
    pub external_ref_id: Option<String>,
}

/// The privileged operation behind the pipeline.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, job: &QueueMessage) -> Result<ExecutionReceipt, ExecutorError>;
}

/// Stand-in executor that acknowledges jobs without touching any provider.
///
/// Wired into the `run` subcommand so the pipeline can be exercised end to
/// end locally; deployments supply their own [`ActionExecutor`].
pub struct NoopExecutor;

#[async_trait]
impl ActionExecutor for NoopExecutor {
    async fn execute(&self, job: &QueueMessage) -> Result<ExecutionReceipt, ExecutorError> {
        tracing::info!(
            correlation_id = %job.correlation_id,
            action = %job.action,
            principal = %job.principal,
            entitlement = %job.entitlement,
            target_cloud = %job.target_cloud,
            "no-op executor acknowledged job"
        );
        Ok(ExecutionReceipt {
            external_ref_id: None,
        })
    }
}
