//! SubmissionService - the accept side of the pipeline.

use std::sync::Arc;

use tracing::{error, info};

use crate::domain::{CourierError, JobId, JobRecord, JobStatus, NotificationRequest};
use crate::ports::{Clock, IdGenerator, JobStore, QueueBroker};

/// Validates a request, persists it as a `queued` job and enqueues its id.
///
/// Returns as soon as the job is on the queue; delivery happens on a worker.
pub struct SubmissionService {
    jobs: Arc<dyn JobStore>,
    broker: Arc<dyn QueueBroker>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    default_subject: String,
}

impl SubmissionService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        broker: Arc<dyn QueueBroker>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
        default_subject: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            broker,
            ids,
            clock,
            default_subject: default_subject.into(),
        }
    }

    /// Validation errors are returned before anything is persisted.
    pub async fn submit(&self, request: NotificationRequest) -> Result<JobId, CourierError> {
        let message = request.validate(&self.default_subject)?;
        let job = JobRecord::new(self.ids.generate_job_id(), message, self.clock.now());
        let job_id = job.id;
        let recipients = job.recipients.len();

        self.jobs.create(job).await?;

        if let Err(e) = self.broker.enqueue(job_id).await {
            error!(job_id = %job_id, error = %e, "enqueue failed, failing job");
            if let Err(mark) = self.jobs.update_status(job_id, JobStatus::Failed).await {
                error!(job_id = %job_id, error = %mark, "could not mark job failed");
            }
            return Err(e.into());
        }

        info!(job_id = %job_id, recipients, "job queued");
        Ok(job_id)
    }
}
