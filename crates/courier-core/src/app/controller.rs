//! JobController - drives one job through its lifecycle.
//!
//! load → (skip if terminal) → processing → dispatch → outcomes → completed
//! → report.
//!
//! Failures before `processing` is durable go back to the broker. Failures
//! while recording the outcome end the job as `failed` with no report.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::dispatcher::BatchDispatcher;
use crate::domain::{JobId, JobRecord, JobStatus, OutcomeMap, Report, ReportId, StoreError};
use crate::ports::{Clock, IdGenerator, JobLease, JobStore, ReportStore};

/// What happened to a delivery, and therefore what the lease should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Outcomes recorded and report emitted.
    Completed { report_id: ReportId },

    /// Outcome could not be recorded; the job is now `failed`.
    Failed { reason: String },

    /// Redelivery of a job that had already finished. Nothing was sent.
    AlreadyTerminal(JobStatus),

    /// The broker handed out an id the job store does not know.
    Discarded,

    /// Hand the job back to the broker for redelivery.
    Retry { reason: String },
}

impl Disposition {
    pub fn acknowledges(&self) -> bool {
        !matches!(self, Disposition::Retry { .. })
    }
}

pub struct JobController {
    jobs: Arc<dyn JobStore>,
    reports: Arc<dyn ReportStore>,
    dispatcher: BatchDispatcher,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl JobController {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        reports: Arc<dyn ReportStore>,
        dispatcher: BatchDispatcher,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            jobs,
            reports,
            dispatcher,
            ids,
            clock,
        }
    }

    /// Run the job behind `lease` and settle the lease accordingly.
    ///
    /// The lease is renewed every third of its timeout while the job runs, so
    /// only a holder that stopped running loses the claim.
    pub async fn process_lease(&self, lease: Box<dyn JobLease>) -> Disposition {
        let job_id = lease.job_id();
        if lease.delivery() > 1 {
            warn!(job_id = %job_id, delivery = lease.delivery(), "job redelivered");
        }

        let period = (lease.lease_timeout() / 3).max(Duration::from_millis(1));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let run = self.handle(job_id);
        tokio::pin!(run);
        let disposition = loop {
            tokio::select! {
                disposition = &mut run => break disposition,
                _ = heartbeat.tick() => match lease.extend().await {
                    Ok(()) => debug!(job_id = %job_id, "lease extended"),
                    Err(e) => warn!(job_id = %job_id, error = %e, "could not extend lease"),
                },
            }
        };

        let settled = match &disposition {
            Disposition::Retry { reason } => lease.retry(reason.clone()).await,
            _ => lease.ack().await,
        };
        if let Err(e) = settled {
            // the broker will redeliver; the terminal check makes that harmless
            warn!(job_id = %job_id, error = %e, "could not settle lease");
        }
        disposition
    }

    pub async fn handle(&self, job_id: JobId) -> Disposition {
        let job = match self.jobs.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                error!(job_id = %job_id, "job not found, discarding delivery");
                return Disposition::Discarded;
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "could not load job");
                return Disposition::Retry {
                    reason: e.to_string(),
                };
            }
        };

        if job.status.is_terminal() {
            return self.settle_terminal(&job).await;
        }
        if job.status == JobStatus::Processing {
            warn!(
                job_id = %job_id,
                runs = job.runs,
                "previous run did not finish, dispatching to every recipient again"
            );
        }

        let job = match self.jobs.update_status(job_id, JobStatus::Processing).await {
            Ok(job) => job,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "could not mark job processing");
                return Disposition::Retry {
                    reason: e.to_string(),
                };
            }
        };
        info!(
            job_id = %job_id,
            run = job.runs,
            recipients = job.recipients.len(),
            "job processing"
        );

        let outcomes = self
            .dispatcher
            .dispatch(&job.recipients, &job.subject, &job.body)
            .await;

        let completed = match self.record_outcomes(job_id, outcomes).await {
            Ok(job) => job,
            Err(e) => return self.fail(job_id, e).await,
        };
        let counts = completed.counts();
        info!(
            job_id = %job_id,
            total = counts.total,
            success = counts.success,
            failure = counts.failure,
            "job completed"
        );

        match self.emit_report(&completed).await {
            Ok(report_id) => Disposition::Completed { report_id },
            Err(e) => {
                // outcomes are durable; a redelivery rebuilds the report without sending
                error!(job_id = %job_id, error = %e, "could not store report");
                Disposition::Retry {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Fail a job the broker gave up on. Returns false if the store could not
    /// be updated and the caller should try again later.
    pub async fn fail_abandoned(&self, job_id: JobId) -> bool {
        let job = match self.jobs.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return true,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "could not load dead-lettered job");
                return false;
            }
        };
        if job.status.is_terminal() {
            return true;
        }

        match self.jobs.update_status(job_id, JobStatus::Failed).await {
            Ok(_) => {
                error!(job_id = %job_id, runs = job.runs, "delivery budget exhausted, job failed");
                true
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "could not mark dead-lettered job failed");
                false
            }
        }
    }

    async fn record_outcomes(
        &self,
        job_id: JobId,
        outcomes: OutcomeMap,
    ) -> Result<JobRecord, StoreError> {
        self.jobs.append_outcomes(job_id, outcomes).await?;
        self.jobs.update_status(job_id, JobStatus::Completed).await
    }

    async fn fail(&self, job_id: JobId, cause: StoreError) -> Disposition {
        error!(job_id = %job_id, error = %cause, "could not record outcome, failing job");
        match self.jobs.update_status(job_id, JobStatus::Failed).await {
            Ok(_) => Disposition::Failed {
                reason: cause.to_string(),
            },
            Err(e) => {
                // still processing in the store; let the broker drive it again
                error!(job_id = %job_id, error = %e, "could not mark job failed");
                Disposition::Retry {
                    reason: cause.to_string(),
                }
            }
        }
    }

    /// A completed job whose report never got written gets it now.
    async fn settle_terminal(&self, job: &JobRecord) -> Disposition {
        info!(job_id = %job.id, status = %job.status, "job already terminal, skipping dispatch");
        if job.status != JobStatus::Completed {
            return Disposition::AlreadyTerminal(job.status);
        }

        let existing = match self.reports.find_by_job_id(job.id).await {
            Ok(existing) => existing,
            Err(e) => {
                error!(job_id = %job.id, error = %e, "could not look up report");
                return Disposition::Retry {
                    reason: e.to_string(),
                };
            }
        };
        if existing.is_none()
            && let Err(e) = self.emit_report(job).await
        {
            error!(job_id = %job.id, error = %e, "could not store report");
            return Disposition::Retry {
                reason: e.to_string(),
            };
        }
        Disposition::AlreadyTerminal(job.status)
    }

    async fn emit_report(&self, job: &JobRecord) -> Result<ReportId, StoreError> {
        let report = Report::from_job(self.ids.generate_report_id(), job, self.clock.now())
            .ok_or(StoreError::IncompleteOutcomes(job.id))?;
        let report_id = report.id;
        let counts = report.counts();

        self.reports.create(report).await?;
        info!(
            job_id = %job.id,
            report_id = %report_id,
            total = counts.total,
            success = counts.success,
            failure = counts.failure,
            "report emitted"
        );
        Ok(report_id)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::time::Duration;

    use chrono::Utc;
    use ulid::Ulid;

    use super::*;
    use crate::app::dispatcher::DispatchSettings;
    use crate::domain::{DEFAULT_SUBJECT, DeliveryOutcome, NotificationRequest};
    use crate::impls::{InMemoryJobStore, InMemoryReportStore, ScriptedGateway, StoreOp};
    use crate::ports::{QueueBroker, SystemClock, UlidGenerator};
    use crate::queue::{BrokerSettings, DeliveryState, InMemoryBroker};

    struct Harness {
        jobs: Arc<InMemoryJobStore>,
        reports: Arc<InMemoryReportStore>,
        gateway: Arc<ScriptedGateway>,
        controller: Arc<JobController>,
    }

    impl Harness {
        fn new(gateway: ScriptedGateway, batch_size: usize) -> Self {
            let jobs = Arc::new(InMemoryJobStore::default());
            let reports = Arc::new(InMemoryReportStore::new());
            let gateway = Arc::new(gateway);
            let dispatcher = BatchDispatcher::new(
                gateway.clone(),
                DispatchSettings {
                    batch_size: NonZeroUsize::new(batch_size).unwrap(),
                    send_timeout: None,
                },
            );
            let controller = Arc::new(JobController::new(
                jobs.clone(),
                reports.clone(),
                dispatcher,
                Arc::new(UlidGenerator::new(SystemClock)),
                Arc::new(SystemClock),
            ));
            Self {
                jobs,
                reports,
                gateway,
                controller,
            }
        }

        async fn queue_job(&self, recipients: &[&str]) -> JobId {
            let message = NotificationRequest::new(recipients.iter().copied(), "hello")
                .validate(DEFAULT_SUBJECT)
                .unwrap();
            let job = JobRecord::new(JobId::from_ulid(Ulid::new()), message, Utc::now());
            let id = job.id;
            self.jobs.create(job).await.unwrap();
            id
        }

        async fn job(&self, id: JobId) -> JobRecord {
            self.jobs.find_by_id(id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn partial_failure_completes_with_report() {
        let h = Harness::new(ScriptedGateway::new().failing(["b@x.com"]), 2);
        let id = h.queue_job(&["a@x.com", "b@x.com", "c@x.com"]).await;

        let disposition = h.controller.handle(id).await;
        let Disposition::Completed { report_id } = disposition else {
            panic!("expected completion, got {disposition:?}");
        };

        let job = h.job(id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.outcomes_complete());
        assert_eq!(job.outcomes[&job.recipients[1]], DeliveryOutcome::Failure);

        let report = h.reports.find_by_id(report_id).await.unwrap().unwrap();
        assert_eq!(report.job_id, id);
        assert_eq!(
            (report.total_count, report.success_count, report.failure_count),
            (3, 2, 1)
        );
        let rows: Vec<(&str, DeliveryOutcome)> = report
            .rows
            .iter()
            .map(|row| (row.recipient.as_str(), row.outcome))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("a@x.com", DeliveryOutcome::Success),
                ("b@x.com", DeliveryOutcome::Failure),
                ("c@x.com", DeliveryOutcome::Success),
            ]
        );
    }

    #[tokio::test]
    async fn every_send_failing_still_completes() {
        let h = Harness::new(ScriptedGateway::new().fail_all(), 3);
        let id = h
            .queue_job(&["a@x.com", "b@x.com", "c@x.com", "d@x.com"])
            .await;

        assert!(matches!(
            h.controller.handle(id).await,
            Disposition::Completed { .. }
        ));
        let report = h.reports.find_by_job_id(id).await.unwrap().unwrap();
        assert_eq!(report.failure_count, 4);
        assert_eq!(report.success_count, 0);
        assert_eq!(h.job(id).await.status, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn report_order_ignores_completion_order() {
        let gateway = ScriptedGateway::new()
            .delay_for("a@x.com", Duration::from_millis(30))
            .delay_for("b@x.com", Duration::from_millis(20))
            .delay_for("c@x.com", Duration::from_millis(10));
        let h = Harness::new(gateway, 3);
        let id = h.queue_job(&["a@x.com", "b@x.com", "c@x.com"]).await;

        h.controller.handle(id).await;

        let report = h.reports.find_by_job_id(id).await.unwrap().unwrap();
        let order: Vec<&str> = report.rows.iter().map(|r| r.recipient.as_str()).collect();
        assert_eq!(order, vec!["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[tokio::test]
    async fn outcome_write_failure_fails_job_without_report() {
        let h = Harness::new(ScriptedGateway::new(), 2);
        let id = h.queue_job(&["a@x.com", "b@x.com"]).await;
        h.jobs.fail(StoreOp::AppendOutcomes, 1).await;

        let disposition = h.controller.handle(id).await;
        assert!(matches!(disposition, Disposition::Failed { .. }));
        assert!(disposition.acknowledges());

        let job = h.job(id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.outcomes.is_empty());
        assert!(h.reports.is_empty().await);
    }

    #[tokio::test]
    async fn completion_write_failure_fails_job_without_report() {
        let h = Harness::new(ScriptedGateway::new(), 2);
        let id = h.queue_job(&["a@x.com"]).await;
        h.jobs.fail(StoreOp::UpdateStatus(JobStatus::Completed), 1).await;

        assert!(matches!(
            h.controller.handle(id).await,
            Disposition::Failed { .. }
        ));
        assert_eq!(h.job(id).await.status, JobStatus::Failed);
        assert!(h.reports.is_empty().await);
    }

    #[tokio::test]
    async fn failure_before_processing_is_retried_without_sending() {
        let h = Harness::new(ScriptedGateway::new(), 2);
        let id = h.queue_job(&["a@x.com"]).await;
        h.jobs.fail(StoreOp::UpdateStatus(JobStatus::Processing), 1).await;

        let disposition = h.controller.handle(id).await;
        assert!(matches!(disposition, Disposition::Retry { .. }));
        assert!(!disposition.acknowledges());
        assert_eq!(h.job(id).await.status, JobStatus::Queued);
        assert!(h.gateway.sends().await.is_empty());
    }

    #[tokio::test]
    async fn redelivered_terminal_job_sends_nothing() {
        let h = Harness::new(ScriptedGateway::new(), 2);
        let id = h.queue_job(&["a@x.com", "b@x.com"]).await;

        h.controller.handle(id).await;
        let again = h.controller.handle(id).await;

        assert_eq!(again, Disposition::AlreadyTerminal(JobStatus::Completed));
        assert_eq!(h.gateway.sends().await.len(), 2);
        assert_eq!(h.reports.len().await, 1);
        assert_eq!(h.job(id).await.runs, 1);
    }

    #[tokio::test]
    async fn redelivered_failed_job_stays_failed() {
        let h = Harness::new(ScriptedGateway::new(), 2);
        let id = h.queue_job(&["a@x.com"]).await;
        h.jobs.fail(StoreOp::AppendOutcomes, 1).await;
        h.controller.handle(id).await;

        assert_eq!(
            h.controller.handle(id).await,
            Disposition::AlreadyTerminal(JobStatus::Failed)
        );
        assert_eq!(h.gateway.sends().await.len(), 1);
    }

    #[tokio::test]
    async fn lost_report_is_rebuilt_on_redelivery() {
        let h = Harness::new(ScriptedGateway::new().failing(["b@x.com"]), 2);
        let id = h.queue_job(&["a@x.com", "b@x.com"]).await;
        h.reports.fail(StoreOp::CreateReport, 1).await;

        assert!(matches!(
            h.controller.handle(id).await,
            Disposition::Retry { .. }
        ));
        assert_eq!(h.job(id).await.status, JobStatus::Completed);
        assert!(h.reports.is_empty().await);

        assert_eq!(
            h.controller.handle(id).await,
            Disposition::AlreadyTerminal(JobStatus::Completed)
        );
        let report = h.reports.find_by_job_id(id).await.unwrap().unwrap();
        assert_eq!(report.failure_count, 1);
        assert_eq!(h.gateway.sends().await.len(), 2);
    }

    #[tokio::test]
    async fn crash_mid_batch_then_redelivery_reaches_terminal_state() {
        let h = Harness::new(ScriptedGateway::new().hanging(["c@x.com"]), 2);
        let id = h.queue_job(&["a@x.com", "b@x.com", "c@x.com"]).await;

        let controller = h.controller.clone();
        let run = tokio::spawn(async move { controller.handle(id).await });
        while h.gateway.attempts("c@x.com").await == 0 {
            tokio::task::yield_now().await;
        }
        // worker dies with the second batch in flight
        run.abort();
        assert!(run.await.unwrap_err().is_cancelled());

        let stranded = h.job(id).await;
        assert_eq!(stranded.status, JobStatus::Processing);
        assert!(stranded.outcomes.is_empty());

        h.gateway.stop_hanging().await;
        assert!(matches!(
            h.controller.handle(id).await,
            Disposition::Completed { .. }
        ));

        let job = h.job(id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.runs, 2);
        assert!(job.outcomes_complete());
        // full re-dispatch: the first batch went out twice
        assert_eq!(h.gateway.attempts("a@x.com").await, 2);
        assert_eq!(h.reports.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_job_is_discarded() {
        let h = Harness::new(ScriptedGateway::new(), 2);
        let disposition = h.controller.handle(JobId::from_ulid(Ulid::new())).await;
        assert_eq!(disposition, Disposition::Discarded);
        assert!(disposition.acknowledges());
    }

    #[tokio::test]
    async fn process_lease_acks_finished_jobs() {
        let h = Harness::new(ScriptedGateway::new(), 2);
        let broker = InMemoryBroker::default();
        let id = h.queue_job(&["a@x.com"]).await;
        broker.enqueue(id).await.unwrap();

        let lease = broker.lease().await.unwrap();
        h.controller.process_lease(lease).await;

        assert_eq!(broker.delivery_state(id).await, Some(DeliveryState::Acked));
    }

    #[tokio::test]
    async fn process_lease_hands_unstarted_jobs_back() {
        let h = Harness::new(ScriptedGateway::new(), 2);
        let broker = InMemoryBroker::new(BrokerSettings {
            max_deliveries: 3,
            ..BrokerSettings::default()
        });
        let id = h.queue_job(&["a@x.com"]).await;
        broker.enqueue(id).await.unwrap();
        h.jobs.fail(StoreOp::FindJob, 1).await;

        let lease = broker.lease().await.unwrap();
        let disposition = h.controller.process_lease(lease).await;

        assert!(matches!(disposition, Disposition::Retry { .. }));
        assert_eq!(
            broker.delivery_state(id).await,
            Some(DeliveryState::RetryScheduled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn process_lease_renews_while_sending() {
        let h = Harness::new(ScriptedGateway::new().with_delay(Duration::from_secs(1)), 1);
        let broker = Arc::new(InMemoryBroker::new(BrokerSettings {
            lease_timeout: Duration::from_secs(2),
            ..BrokerSettings::default()
        }));
        let id = h.queue_job(&["a@x.com", "b@x.com", "c@x.com", "d@x.com"]).await;
        broker.enqueue(id).await.unwrap();

        let lease = broker.lease().await.unwrap();
        let controller = h.controller.clone();
        let run = tokio::spawn(async move { controller.process_lease(lease).await });

        // a second claimant finds nothing for well past the lease timeout
        let rival = tokio::time::timeout(Duration::from_secs(3), broker.lease()).await;
        assert!(rival.is_err());

        assert!(matches!(run.await.unwrap(), Disposition::Completed { .. }));
        let record = broker.record(id).await.unwrap();
        assert_eq!(record.state, DeliveryState::Acked);
        assert_eq!(record.deliveries, 1);
        assert_eq!(h.gateway.sends().await.len(), 4);
    }

    #[tokio::test]
    async fn abandoned_job_is_failed() {
        let h = Harness::new(ScriptedGateway::new(), 2);
        let id = h.queue_job(&["a@x.com"]).await;

        assert!(h.controller.fail_abandoned(id).await);
        assert_eq!(h.job(id).await.status, JobStatus::Failed);
        assert!(h.reports.is_empty().await);
    }

    #[tokio::test]
    async fn abandoned_terminal_job_is_left_alone() {
        let h = Harness::new(ScriptedGateway::new(), 2);
        let id = h.queue_job(&["a@x.com"]).await;
        h.controller.handle(id).await;

        assert!(h.controller.fail_abandoned(id).await);
        assert_eq!(h.job(id).await.status, JobStatus::Completed);
        assert!(h.controller.fail_abandoned(JobId::from_ulid(Ulid::new())).await);
    }

    #[tokio::test]
    async fn abandoned_job_write_failure_asks_for_another_try() {
        let h = Harness::new(ScriptedGateway::new(), 2);
        let id = h.queue_job(&["a@x.com"]).await;
        h.jobs.fail(StoreOp::UpdateStatus(JobStatus::Failed), 1).await;

        assert!(!h.controller.fail_abandoned(id).await);
        assert_eq!(h.job(id).await.status, JobStatus::Queued);
        assert!(h.controller.fail_abandoned(id).await);
        assert_eq!(h.job(id).await.status, JobStatus::Failed);
    }
}
