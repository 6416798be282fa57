//! Per-job bookkeeping inside the broker.
//!
//! Mutations go through the methods below so `state`, lease fields and
//! `updated_at` always change together:
//!
//! | method           | state after      | clears              |
//! |------------------|------------------|---------------------|
//! | `start_lease`    | `Leased`         | -                   |
//! | `extend_lease`   | unchanged        | -                   |
//! | `mark_acked`     | `Acked`          | lease expiry        |
//! | `mark_dead`      | `Dead`           | lease expiry        |
//! | `schedule_retry` | `RetryScheduled` | lease expiry        |
//! | `requeue`        | `Ready`          | expiry and run time |

use tokio::time::Instant;

use super::DeliveryState;
use crate::domain::JobId;

/// Broker metadata for one job.
///
/// Queue structures (ready / scheduled) hold `JobId`s only; every state
/// change happens here.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub job_id: JobId,
    pub state: DeliveryState,

    /// Number of times the job has been leased, including the current lease.
    pub deliveries: u32,

    /// Identifies the current lease so a stale holder cannot ack a job that
    /// was already handed to someone else.
    pub lease_seq: u64,

    pub lease_expires_at: Option<Instant>,
    pub next_run_at: Option<Instant>,
    pub last_error: Option<String>,

    pub enqueued_at: Instant,
    pub updated_at: Instant,
}

impl DeliveryRecord {
    pub fn new(job_id: JobId) -> Self {
        let now = Instant::now();
        Self {
            job_id,
            state: DeliveryState::Ready,
            deliveries: 0,
            lease_seq: 0,
            lease_expires_at: None,
            next_run_at: None,
            last_error: None,
            enqueued_at: now,
            updated_at: now,
        }
    }

    pub fn start_lease(&mut self, seq: u64, expires_at: Instant) {
        self.state = DeliveryState::Leased;
        self.deliveries += 1;
        self.lease_seq = seq;
        self.lease_expires_at = Some(expires_at);
        self.updated_at = Instant::now();
    }

    /// Push the expiry of the current lease out to `expires_at`.
    pub fn extend_lease(&mut self, expires_at: Instant) {
        self.lease_expires_at = Some(expires_at);
        self.updated_at = Instant::now();
    }

    pub fn holds_lease(&self, seq: u64) -> bool {
        self.state == DeliveryState::Leased && self.lease_seq == seq
    }

    pub fn mark_acked(&mut self) {
        self.state = DeliveryState::Acked;
        self.lease_expires_at = None;
        self.updated_at = Instant::now();
    }

    pub fn mark_dead(&mut self, error: String) {
        self.state = DeliveryState::Dead;
        self.lease_expires_at = None;
        self.last_error = Some(error);
        self.updated_at = Instant::now();
    }

    pub fn schedule_retry(&mut self, next_run_at: Instant, error: String) {
        self.state = DeliveryState::RetryScheduled;
        self.lease_expires_at = None;
        self.next_run_at = Some(next_run_at);
        self.last_error = Some(error);
        self.updated_at = Instant::now();
    }

    /// Back to Ready, from RetryScheduled or an expired lease.
    pub fn requeue(&mut self) {
        self.state = DeliveryState::Ready;
        self.lease_expires_at = None;
        self.next_run_at = None;
        self.updated_at = Instant::now();
    }
}
