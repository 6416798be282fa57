//! Delivery state of a job inside the broker.
//!
//! # Two state machines
//! A job has two states that move independently:
//! - `JobStatus` in the job store: the business lifecycle a client sees
//! - `DeliveryState` here: who currently holds the job in the broker
//!
//! They meet at the edges. An `Acked` delivery follows a terminal job status.
//! A `Dead` delivery is turned into a `failed` job by the reaper.

use serde::{Deserialize, Serialize};

/// Broker-side delivery state. This is independent of the job's lifecycle
/// status in the `JobStore`: the broker only tracks who holds the job.
///
/// State transitions:
/// - Ready -> Leased -> Acked
/// - Ready -> Leased -> RetryScheduled -> Ready (until max_deliveries)
/// - Ready -> Leased -> Ready (lease expired, worker presumed dead)
/// - Ready -> Leased -> Dead (max_deliveries exhausted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryState {
    /// Waiting for a worker.
    Ready,

    /// Claimed by a worker, not yet acknowledged.
    Leased,

    /// Waiting out a backoff delay before becoming Ready again.
    RetryScheduled,

    /// Acknowledged by the worker.
    Acked,

    /// Given up after too many deliveries.
    Dead,
}

impl DeliveryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryState::Acked | DeliveryState::Dead)
    }

    pub fn is_leasable(self) -> bool {
        matches!(self, DeliveryState::Ready)
    }
}
