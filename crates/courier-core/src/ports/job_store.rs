//! JobStore port - durable job records.

use async_trait::async_trait;

use crate::domain::{JobId, JobRecord, JobStatus, OutcomeMap, StoreError};

/// Source of truth for job state.
///
/// - `update_status` validates the transition against the record's current
///   status and fails with `StoreError::Transition` on an illegal edge.
/// - `append_outcomes` replaces the stored outcome map in a single write, so
///   a reader never observes half of a dispatch run.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: JobRecord) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: JobId) -> Result<Option<JobRecord>, StoreError>;

    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<JobRecord, StoreError>;

    async fn append_outcomes(&self, id: JobId, outcomes: OutcomeMap) -> Result<(), StoreError>;
}
