//! In-memory job and report stores.
//!
//! Both stores accept injected faults so tests can exercise the paths where
//! persistence fails at a specific step of the lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    JobId, JobRecord, JobStatus, OutcomeMap, Report, ReportId, StoreError,
};
use crate::ports::{Clock, JobStore, ReportStore, SystemClock};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    CreateJob,
    FindJob,
    /// Status update towards the given target.
    UpdateStatus(JobStatus),
    AppendOutcomes,
    CreateReport,
    FindReport,
}

/// Remaining forced failures per operation.
#[derive(Debug, Default)]
struct Faults {
    remaining: HashMap<StoreOp, u32>,
}

impl Faults {
    fn set(&mut self, op: StoreOp, times: u32) {
        if times == 0 {
            self.remaining.remove(&op);
        } else {
            self.remaining.insert(op, times);
        }
    }

    fn check(&mut self, op: StoreOp) -> Result<(), StoreError> {
        let Some(left) = self.remaining.get_mut(&op) else {
            return Ok(());
        };
        if *left != u32::MAX {
            *left -= 1;
        }
        if *left == 0 {
            self.remaining.remove(&op);
        }
        Err(StoreError::Unavailable(format!("injected fault on {op:?}")))
    }
}

#[derive(Default)]
struct JobState {
    jobs: HashMap<JobId, JobRecord>,
    faults: Faults,
}

pub struct InMemoryJobStore {
    state: Mutex<JobState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryJobStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(JobState::default()),
            clock,
        }
    }

    /// Make the next `times` calls of `op` fail. `u32::MAX` fails forever,
    /// `0` clears the fault.
    pub async fn fail(&self, op: StoreOp, times: u32) {
        self.state.lock().await.faults.set(op, times);
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    /// Every stored job, oldest first.
    pub async fn all(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.state.lock().await.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| (job.created_at, job.id));
        jobs
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: JobRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.faults.check(StoreOp::CreateJob)?;
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::JobExists(job.id));
        }
        state.jobs.insert(job.id, job);
        Ok(())
    }

    async fn find_by_id(&self, id: JobId) -> Result<Option<JobRecord>, StoreError> {
        let mut state = self.state.lock().await;
        state.faults.check(StoreOp::FindJob)?;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn update_status(&self, id: JobId, status: JobStatus) -> Result<JobRecord, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.faults.check(StoreOp::UpdateStatus(status))?;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        if status == JobStatus::Completed && !job.outcomes_complete() {
            return Err(StoreError::IncompleteOutcomes(id));
        }
        job.transition(status, now)?;
        Ok(job.clone())
    }

    async fn append_outcomes(&self, id: JobId, outcomes: OutcomeMap) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.faults.check(StoreOp::AppendOutcomes)?;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        if job.status.is_terminal() {
            return Err(StoreError::Immutable(id));
        }
        job.outcomes = outcomes;
        job.updated_at = now;
        Ok(())
    }
}

#[derive(Default)]
struct ReportState {
    reports: HashMap<ReportId, Report>,
    by_job: HashMap<JobId, ReportId>,
    faults: Faults,
}

#[derive(Default)]
pub struct InMemoryReportStore {
    state: Mutex<ReportState>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail(&self, op: StoreOp, times: u32) {
        self.state.lock().await.faults.set(op, times);
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.reports.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn create(&self, report: Report) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.faults.check(StoreOp::CreateReport)?;
        if let Some(existing) = state.by_job.get(&report.job_id) {
            return Err(StoreError::ReportExists {
                job_id: report.job_id,
                report_id: *existing,
            });
        }
        state.by_job.insert(report.job_id, report.id);
        state.reports.insert(report.id, report);
        Ok(())
    }

    async fn find_by_id(&self, id: ReportId) -> Result<Option<Report>, StoreError> {
        let mut state = self.state.lock().await;
        state.faults.check(StoreOp::FindReport)?;
        Ok(state.reports.get(&id).cloned())
    }

    async fn find_by_job_id(&self, job_id: JobId) -> Result<Option<Report>, StoreError> {
        let mut state = self.state.lock().await;
        state.faults.check(StoreOp::FindReport)?;
        Ok(state
            .by_job
            .get(&job_id)
            .and_then(|id| state.reports.get(id))
            .cloned())
    }
}
