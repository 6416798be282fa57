//! Job lifecycle state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::InvalidTransition;

/// Lifecycle status of a dispatch job.
///
/// State transitions:
/// - Queued -> Processing -> Completed
/// - Queued -> Processing -> Failed
/// - Queued -> Failed (the job could not be handed to the broker)
/// - Processing -> Processing (re-entry when the broker redelivers a job whose
///   worker died mid-dispatch)
///
/// Completed and Failed are terminal. Nothing leaves them, and nothing returns
/// to Queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted and waiting for a worker.
    Queued,

    /// A worker has claimed the job and is (or was) sending.
    Processing,

    /// Every recipient was attempted and the outcomes are durable.
    Completed,

    /// An infrastructure error prevented the job from reaching Completed.
    Failed,
}

impl JobStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal edge of the state machine.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Queued, Failed)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Validate the edge and return the new status.
    pub fn transition_to(self, next: JobStatus) -> Result<JobStatus, InvalidTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::start(JobStatus::Queued, JobStatus::Processing)]
    #[case::enqueue_failed(JobStatus::Queued, JobStatus::Failed)]
    #[case::redelivery(JobStatus::Processing, JobStatus::Processing)]
    #[case::complete(JobStatus::Processing, JobStatus::Completed)]
    #[case::fail(JobStatus::Processing, JobStatus::Failed)]
    fn legal_transitions(#[case] from: JobStatus, #[case] to: JobStatus) {
        assert_eq!(from.transition_to(to), Ok(to));
    }

    #[rstest]
    #[case::skip_processing(JobStatus::Queued, JobStatus::Completed)]
    #[case::requeue(JobStatus::Processing, JobStatus::Queued)]
    #[case::completed_to_failed(JobStatus::Completed, JobStatus::Failed)]
    #[case::completed_again(JobStatus::Completed, JobStatus::Completed)]
    #[case::failed_restart(JobStatus::Failed, JobStatus::Processing)]
    #[case::failed_to_queued(JobStatus::Failed, JobStatus::Queued)]
    fn illegal_transitions(#[case] from: JobStatus, #[case] to: JobStatus) {
        let err = from.transition_to(to).unwrap_err();
        assert_eq!(err.from, from);
        assert_eq!(err.to, to);
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&JobStatus::Processing).unwrap();
        assert_eq!(s, "\"processing\"");
    }
}
