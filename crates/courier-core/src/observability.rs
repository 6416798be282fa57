use serde::{Deserialize, Serialize};

/// Broker-side view of where jobs are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub ready: usize,
    pub leased: usize,
    pub retry_scheduled: usize,
    pub acked: usize,
    pub dead: usize,
}
