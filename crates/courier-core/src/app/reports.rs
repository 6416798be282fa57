//! ReportService - read side for delivery reports.

use std::sync::Arc;

use crate::domain::{CourierError, JobId, ReportExport, ReportId, StoreError};
use crate::ports::ReportStore;

pub struct ReportService {
    reports: Arc<dyn ReportStore>,
}

impl ReportService {
    pub fn new(reports: Arc<dyn ReportStore>) -> Self {
        Self { reports }
    }

    /// Tabular export for the report of `job_id`.
    ///
    /// Only completed jobs have a report; anything else is `ReportNotFound`.
    pub async fn export(&self, job_id: JobId) -> Result<ReportExport, CourierError> {
        let report = self
            .reports
            .find_by_job_id(job_id)
            .await?
            .ok_or_else(|| StoreError::ReportNotFound(job_id.to_string()))?;
        Ok(ReportExport::from(&report))
    }

    pub async fn export_by_report(&self, report_id: ReportId) -> Result<ReportExport, CourierError> {
        let report = self
            .reports
            .find_by_id(report_id)
            .await?
            .ok_or_else(|| StoreError::ReportNotFound(report_id.to_string()))?;
        Ok(ReportExport::from(&report))
    }

    /// Resolve `key` as a report id first, then as a job id.
    pub async fn lookup(&self, key: &str) -> Result<ReportExport, CourierError> {
        let key = key.trim();

        if let Ok(report_id) = key.parse::<ReportId>()
            && let Some(report) = self.reports.find_by_id(report_id).await?
        {
            return Ok(ReportExport::from(&report));
        }
        if let Ok(job_id) = key.parse::<JobId>()
            && let Some(report) = self.reports.find_by_job_id(job_id).await?
        {
            return Ok(ReportExport::from(&report));
        }

        Err(StoreError::ReportNotFound(key.to_string()).into())
    }
}
