//! ReportStore port - write-once delivery reports.

use async_trait::async_trait;

use crate::domain::{JobId, Report, ReportId, StoreError};

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Fails with `StoreError::ReportExists` if the job already has a report.
    async fn create(&self, report: Report) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: ReportId) -> Result<Option<Report>, StoreError>;

    async fn find_by_job_id(&self, job_id: JobId) -> Result<Option<Report>, StoreError>;
}
