//! Status - what a submitter polls after acceptance.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CourierError, JobId, JobStatus, OutcomeCounts, ReportId, StoreError};
use crate::observability::QueueCounts;
use crate::ports::{JobStore, QueueBroker, ReportStore};

/// Snapshot of one job.
///
/// `counts` only covers recorded outcomes, so it stays empty until the
/// dispatch run has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub recipients: usize,
    pub counts: OutcomeCounts,
    pub runs: u32,
    pub report_id: Option<ReportId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct StatusService {
    jobs: Arc<dyn JobStore>,
    reports: Arc<dyn ReportStore>,
    broker: Arc<dyn QueueBroker>,
}

impl StatusService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        reports: Arc<dyn ReportStore>,
        broker: Arc<dyn QueueBroker>,
    ) -> Self {
        Self {
            jobs,
            reports,
            broker,
        }
    }

    pub async fn status(&self, job_id: JobId) -> Result<JobStatusView, CourierError> {
        let job = self
            .jobs
            .find_by_id(job_id)
            .await?
            .ok_or(StoreError::JobNotFound(job_id))?;

        let report_id = if job.status == JobStatus::Completed {
            self.reports.find_by_job_id(job_id).await?.map(|r| r.id)
        } else {
            None
        };

        Ok(JobStatusView {
            job_id,
            status: job.status,
            recipients: job.recipients.len(),
            counts: job.counts(),
            runs: job.runs,
            report_id,
            created_at: job.created_at,
            updated_at: job.updated_at,
        })
    }

    /// Poll until the job is terminal. Pair with `tokio::time::timeout` to bound the wait.
    pub async fn wait_until_terminal(
        &self,
        job_id: JobId,
        interval: Duration,
    ) -> Result<JobStatusView, CourierError> {
        loop {
            let view = self.status(job_id).await?;
            if view.status.is_terminal() {
                return Ok(view);
            }
            tokio::time::sleep(interval).await;
        }
    }

    pub async fn queue(&self) -> Result<QueueCounts, CourierError> {
        Ok(self.broker.counts().await?)
    }
}
