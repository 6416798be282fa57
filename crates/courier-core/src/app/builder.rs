//! AppBuilder - wiring and start-up validation.
//!
//! Everything is checked in `build()`: a missing gateway or bad settings fail
//! there, before any job is accepted.

use std::sync::Arc;

use super::controller::JobController;
use super::dispatcher::BatchDispatcher;
use super::reports::ReportService;
use super::status::StatusService;
use super::submission::SubmissionService;
use super::worker::WorkerGroup;
use crate::config::CourierConfig;
use crate::domain::ConfigError;
use crate::impls::{InMemoryJobStore, InMemoryReportStore};
use crate::ports::{
    Clock, DeliveryGateway, IdGenerator, JobStore, QueueBroker, ReportStore, SystemClock,
    UlidGenerator,
};
use crate::queue::InMemoryBroker;

/// Builds an `App`.
///
/// Stores and broker default to the in-memory implementations; the gateway
/// has no default and must be provided.
///
/// ```ignore
/// let app = AppBuilder::new(CourierConfig::from_env()?)
///     .gateway(Arc::new(LoggingGateway::new()))
///     .build()?;
/// let workers = app.start_workers();
/// let job_id = app.submission.submit(request).await?;
/// ```
pub struct AppBuilder {
    config: CourierConfig,
    gateway: Option<Arc<dyn DeliveryGateway>>,
    jobs: Option<Arc<dyn JobStore>>,
    reports: Option<Arc<dyn ReportStore>>,
    broker: Option<Arc<dyn QueueBroker>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no delivery gateway configured")]
    MissingGateway,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AppBuilder {
    pub fn new(config: CourierConfig) -> Self {
        Self {
            config,
            gateway: None,
            jobs: None,
            reports: None,
            broker: None,
            clock: None,
            ids: None,
        }
    }

    pub fn gateway(mut self, gateway: Arc<dyn DeliveryGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn job_store(mut self, jobs: Arc<dyn JobStore>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn report_store(mut self, reports: Arc<dyn ReportStore>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn broker(mut self, broker: Arc<dyn QueueBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        self.config.validate()?;
        let dispatch = self.config.dispatch_settings()?;
        let gateway = self.gateway.ok_or(BuildError::MissingGateway)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));
        let jobs = self
            .jobs
            .unwrap_or_else(|| Arc::new(InMemoryJobStore::new(Arc::clone(&clock))));
        let reports = self
            .reports
            .unwrap_or_else(|| Arc::new(InMemoryReportStore::new()));
        let broker = self
            .broker
            .unwrap_or_else(|| Arc::new(InMemoryBroker::new(self.config.broker_settings())));

        let controller = Arc::new(JobController::new(
            Arc::clone(&jobs),
            Arc::clone(&reports),
            BatchDispatcher::new(gateway, dispatch),
            Arc::clone(&ids),
            Arc::clone(&clock),
        ));

        Ok(App {
            submission: SubmissionService::new(
                Arc::clone(&jobs),
                Arc::clone(&broker),
                ids,
                clock,
                self.config.default_subject.clone(),
            ),
            reports: ReportService::new(Arc::clone(&reports)),
            status: StatusService::new(jobs, reports, Arc::clone(&broker)),
            controller,
            broker,
            config: self.config,
        })
    }
}

/// A wired pipeline: the accept side, the read side, and what workers need.
pub struct App {
    pub submission: SubmissionService,
    pub reports: ReportService,
    pub status: StatusService,
    pub controller: Arc<JobController>,
    pub broker: Arc<dyn QueueBroker>,
    pub config: CourierConfig,
}

impl App {
    /// Spawn `config.workers` workers on the current runtime.
    pub fn start_workers(&self) -> WorkerGroup {
        WorkerGroup::spawn(
            self.config.workers,
            Arc::clone(&self.broker),
            Arc::clone(&self.controller),
        )
    }
}
