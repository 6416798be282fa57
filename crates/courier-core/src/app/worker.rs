use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::controller::JobController;
use crate::domain::JobId;
use crate::ports::QueueBroker;

/// How often the reaper collects dead-lettered jobs.
pub const REAP_INTERVAL: Duration = Duration::from_secs(1);

/// Worker group handle.
///
/// - each worker takes one lease at a time and runs the job to the end
/// - a reaper marks jobs the broker dead-lettered as `failed`
/// - `request_shutdown` stops new leases; a job already running finishes
/// - `shutdown_and_join` waits for every worker and the reaper to exit
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers and one reaper against one broker.
    pub fn spawn(n: usize, broker: Arc<dyn QueueBroker>, controller: Arc<JobController>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins: Vec<JoinHandle<()>> = (0..n)
            .map(|worker_id| {
                let broker = Arc::clone(&broker);
                let controller = Arc::clone(&controller);
                let mut rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, broker, controller, &mut rx).await;
                })
            })
            .collect();

        let mut rx = shutdown_rx.clone();
        joins.push(tokio::spawn(async move {
            reaper_loop(broker, controller, &mut rx).await;
        }));

        info!(workers = n, "worker group started");
        Self { shutdown_tx, joins }
    }

    /// Number of workers, not counting the reaper.
    pub fn len(&self) -> usize {
        self.joins.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
        info!("worker group stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    broker: Arc<dyn QueueBroker>,
    controller: Arc<JobController>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // lease() may wait, so race it against shutdown
        let lease = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            lease = broker.lease() => lease,
        };

        let Some(lease) = lease else {
            tokio::task::yield_now().await;
            continue;
        };

        let job_id = lease.job_id();
        let disposition = controller.process_lease(lease).await;
        debug!(worker_id, job_id = %job_id, ?disposition, "lease settled");
    }
    debug!(worker_id, "worker exiting");
}

/// Fail every job the broker gave up on. Ids whose status could not be
/// written are kept and tried again on the next tick.
async fn reaper_loop(
    broker: Arc<dyn QueueBroker>,
    controller: Arc<JobController>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(REAP_INTERVAL);
    let mut pending: Vec<JobId> = Vec::new();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match broker.drain_dead().await {
            Ok(dead) => pending.extend(dead),
            Err(e) => warn!(error = %e, "could not drain dead letters"),
        }

        let mut unsettled = Vec::new();
        for job_id in pending.drain(..) {
            if !controller.fail_abandoned(job_id).await {
                unsettled.push(job_id);
            }
        }
        pending = unsettled;
    }

    if !pending.is_empty() {
        warn!(jobs = pending.len(), "reaper stopped with dead-lettered jobs not yet failed");
    }
    debug!("reaper exiting");
}
