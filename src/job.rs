//! Domain types for entitlement change-request jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a job.
///
/// `Queued` and `InProgress` are transient; `Success` and `Failed` are
/// terminal. Jobs are created `Queued` by the gateway and moved forward
/// only by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Success,
    Failed,
}

impl JobStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown job status '{s}'")),
        }
    }
}

/// The requested operation on an entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    /// Grant the entitlement to the principal.
    Add,
    /// Revoke the entitlement from the principal.
    Remove,
}

impl std::fmt::Display for JobAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

impl std::str::FromStr for JobAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(Self::Add),
            "remove" => Ok(Self::Remove),
            _ => Err(format!("unknown action '{s}'")),
        }
    }
}

/// Kind of principal the entitlement applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalType {
    User,
    Role,
}

impl std::fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "User"),
            Self::Role => write!(f, "Role"),
        }
    }
}

impl std::str::FromStr for PrincipalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "User" => Ok(Self::User),
            "Role" => Ok(Self::Role),
            _ => Err(format!("unknown principal type '{s}'")),
        }
    }
}

/// Whether the entitlement definition is provider-managed or account-managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementType {
    Default,
    Custom,
}

impl std::fmt::Display for EntitlementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for EntitlementType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "custom" => Ok(Self::Custom),
            _ => Err(format!("unknown entitlement type '{s}'")),
        }
    }
}

/// A new job as accepted by the gateway, before it is recorded anywhere.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub correlation_id: Uuid,
    /// Caller-supplied idempotency hint; recorded, not enforced unique.
    pub client_request_id: String,
    pub account_id: String,
    pub principal: String,
    pub principal_type: PrincipalType,
    pub entitlement: String,
    pub entitlement_type: EntitlementType,
    pub action: JobAction,
    pub cloud_provider: String,
    pub received_at: DateTime<Utc>,
}

impl NewJob {
    /// Build the queue payload for this job.
    ///
    /// The message is a copy taken at enqueue time; the store row stays
    /// authoritative for whether the job should actually be processed.
    pub fn to_queue_message(&self) -> QueueMessage {
        QueueMessage {
            correlation_id: self.correlation_id,
            client_request_id: self.client_request_id.clone(),
            account_id: self.account_id.clone(),
            principal: self.principal.clone(),
            principal_type: self.principal_type,
            entitlement: self.entitlement.clone(),
            entitlement_type: self.entitlement_type,
            action: self.action,
            target_cloud: self.cloud_provider.clone(),
            status: JobStatus::Queued,
            received_at: self.received_at,
        }
    }
}

/// The serialized payload carried on the work queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub correlation_id: Uuid,
    pub client_request_id: String,
    pub account_id: String,
    pub principal: String,
    pub principal_type: PrincipalType,
    pub entitlement: String,
    pub entitlement_type: EntitlementType,
    pub action: JobAction,
    pub target_cloud: String,
    pub status: JobStatus,
    pub received_at: DateTime<Utc>,
}

/// Subset of job fields exposed through the status-query contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub correlation_id: Uuid,
    pub status: JobStatus,
}

/// Provider-side audit reference recorded when a job succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalRef {
    pub cloud_provider: String,
    pub external_ref_id: String,
}

/// One row of a job's append-only transition history.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub correlation_id: Uuid,
    /// The status being entered by this transition.
    pub status: JobStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_job() -> NewJob {
        NewJob {
            correlation_id: Uuid::new_v4(),
            client_request_id: "req-001".to_string(),
            account_id: "123456789012".to_string(),
            principal: "deploy-bot".to_string(),
            principal_type: PrincipalType::Role,
            entitlement: "ReadOnlyAccess".to_string(),
            entitlement_type: EntitlementType::Default,
            action: JobAction::Add,
            cloud_provider: "aws".to_string(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn status_wire_format_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(JobStatus::InProgress.to_string(), "in_progress");
        assert_eq!("in_progress".parse::<JobStatus>().unwrap(), JobStatus::InProgress);
    }

    #[test]
    fn status_display_round_trips_through_from_str() {
        for status in [
            JobStatus::Queued,
            JobStatus::InProgress,
            JobStatus::Success,
            JobStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
    }

    #[test]
    fn only_success_and_failed_are_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn queue_message_round_trips_through_json() {
        let msg = sample_job().to_queue_message();
        let bytes = serde_json::to_vec(&msg).unwrap();
        let back: QueueMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn queue_message_carries_the_original_field_names() {
        let msg = sample_job().to_queue_message();
        let value = serde_json::to_value(&msg).unwrap();
        for key in [
            "correlation_id",
            "client_request_id",
            "account_id",
            "principal",
            "principal_type",
            "entitlement",
            "entitlement_type",
            "action",
            "target_cloud",
            "status",
            "received_at",
        ] {
            assert!(value.get(key).is_some(), "missing field {key}");
        }
        assert_eq!(value["action"], "add");
        assert_eq!(value["principal_type"], "Role");
        assert_eq!(value["entitlement_type"], "default");
        assert_eq!(value["status"], "queued");
    }
}
