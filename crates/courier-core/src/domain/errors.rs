//! Error types, one enum per concern.
//!
//! - `ValidationError`: rejected at submission, the job never exists.
//! - `GatewayError`: one recipient could not be delivered to. Recorded as a
//!   `failure` outcome and never escalated.
//! - `StoreError` / `QueueError`: infrastructure. These end a job as `failed`.
//! - `InvalidTransition`: an illegal state-machine edge was requested.
//! - `ConfigError`: bad settings, reported at startup.

use thiserror::Error;

use super::ids::{JobId, ReportId};
use super::state::JobStatus;

/// Classification used by callers that only care about the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Delivery,
    Infrastructure,
    Configuration,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("recipient list must not be empty")]
    NoRecipients,

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("duplicate recipient: {0}")]
    DuplicateRecipient(String),

    #[error("message body must not be empty")]
    EmptyBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("recipient rejected: {0}")]
    Rejected(String),

    #[error("send timed out after {0} ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal job status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job already exists: {0}")]
    JobExists(JobId),

    #[error("report not found: {0}")]
    ReportNotFound(String),

    #[error("report already exists for job {job_id} ({report_id})")]
    ReportExists { job_id: JobId, report_id: ReportId },

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error("job {0} is terminal and can no longer change")]
    Immutable(JobId),

    #[error("job {0} cannot complete before every recipient has an outcome")]
    IncompleteOutcomes(JobId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("lease for {0} is no longer held")]
    LeaseLost(JobId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer (got {value})")]
    NotPositive { name: &'static str, value: String },

    #[error("{name} is not a valid number: {value}")]
    NotANumber { name: &'static str, value: String },

    #[error("invalid {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Aggregate error returned by the application services.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl CourierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CourierError::Validation(_) => ErrorKind::Validation,
            CourierError::Store(_) | CourierError::Queue(_) | CourierError::Transition(_) => {
                ErrorKind::Infrastructure
            }
            CourierError::Config(_) => ErrorKind::Configuration,
        }
    }
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Delivery
    }
}
