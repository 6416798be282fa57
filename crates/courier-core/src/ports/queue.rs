//! QueueBroker port - at-least-once job delivery.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{JobId, QueueError};
use crate::observability::QueueCounts;

/// A claimed job. The worker holding it must `ack` or `retry`.
///
/// A live holder keeps the claim with `extend` at least once per
/// `lease_timeout`. Dropping a lease without settling it is how a crash looks
/// to the broker: the claim expires and the job is delivered again.
#[async_trait]
pub trait JobLease: Send + Sync {
    fn job_id(&self) -> JobId;

    /// How many times this job has been handed out, including this one.
    fn delivery(&self) -> u32;

    /// How long the claim lasts without an `extend`.
    fn lease_timeout(&self) -> Duration;

    /// Renew the claim for another `lease_timeout`.
    async fn extend(&self) -> Result<(), QueueError>;

    /// Processing finished (successfully or with a terminal failure).
    async fn ack(self: Box<Self>) -> Result<(), QueueError>;

    /// Processing could not start; the broker decides between backoff and
    /// dead-lettering.
    async fn retry(self: Box<Self>, error: String) -> Result<(), QueueError>;
}

/// Queue broker port.
///
/// Only job ids travel through the broker; the job itself lives in the
/// `JobStore`. Each job is held by at most one lease at a time.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    async fn enqueue(&self, job_id: JobId) -> Result<(), QueueError>;

    /// Wait until a job is available and claim it.
    async fn lease(&self) -> Option<Box<dyn JobLease>>;

    async fn counts(&self) -> Result<QueueCounts, QueueError>;

    /// Jobs dead-lettered since the last call. Each id is returned once.
    async fn drain_dead(&self) -> Result<Vec<JobId>, QueueError>;
}
