//! Retry policy: maps Action Executor failures to dispositions.
//!
//! Store and queue failures are deliberately not handled here; the worker
//! loop owns those (connectivity problems replay the message, data problems
//! quarantine it). The classifier only answers one question: given that the
//! executor failed, what happens to the job?

use crate::error::ExecutorError;

/// What the worker does with a job whose execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Transient failure: move the job back to `queued` and replay the
    /// message at the front of its queue.
    Retry,
    /// Permanent domain failure: finalize the job as `failed`.
    Fail,
    /// Failure of unknown shape: finalize as `failed` AND quarantine the
    /// message for manual review. Unknowns take the auditable path, never
    /// silent infinite retry.
    FailAndQuarantine,
}

/// Classify an executor failure. Exhaustive over the taxonomy, so adding a
/// variant forces a decision here.
pub fn classify(err: &ExecutorError) -> Disposition {
    match err {
        ExecutorError::Throttled(_) | ExecutorError::Network(_) => Disposition::Retry,
        ExecutorError::EntityNotFound(_)
        | ExecutorError::InvalidInput(_)
        | ExecutorError::AccessDenied(_)
        | ExecutorError::Payload(_) => Disposition::Fail,
        ExecutorError::Other(_) => Disposition::FailAndQuarantine,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_and_network_failures_are_retried() {
        assert_eq!(
            classify(&ExecutorError::Throttled("rate exceeded".into())),
            Disposition::Retry
        );
        assert_eq!(
            classify(&ExecutorError::Network("connection reset".into())),
            Disposition::Retry
        );
    }

    #[test]
    fn domain_failures_are_permanent() {
        assert_eq!(
            classify(&ExecutorError::EntityNotFound("no such principal".into())),
            Disposition::Fail
        );
        assert_eq!(
            classify(&ExecutorError::InvalidInput("bad entitlement name".into())),
            Disposition::Fail
        );
        assert_eq!(
            classify(&ExecutorError::AccessDenied("not authorized".into())),
            Disposition::Fail
        );
        assert_eq!(
            classify(&ExecutorError::Payload("missing account_id".into())),
            Disposition::Fail
        );
    }

    #[test]
    fn unknown_failures_are_quarantined() {
        assert_eq!(
            classify(&ExecutorError::Other("segfault adjacent".into())),
            Disposition::FailAndQuarantine
        );
    }
}
