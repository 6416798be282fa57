//! IdGenerator port - id generation behind a trait.
//!
//! Ids are minted by the application, never by a store, so a job id exists
//! before the job is written and can be logged from the first line.
//!
//! # Implementations
//! - **UlidGenerator**: ULID from an injected `Clock` plus 80 random bits
//!
//! # Thread safety
//! `Send + Sync` is required. One generator is shared by the submission
//! service and every worker.

use crate::domain::ids::{JobId, ReportId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator hands out ids that can be produced on any node without
/// coordination (ULIDs: 48-bit millisecond timestamp + 80 random bits).
pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;

    fn generate_report_id(&self) -> ReportId;
}

/// ULID generator driven by an injected `Clock`, so a `FixedClock` pins the
/// timestamp half of every id.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        JobId::from(self.next_ulid())
    }

    fn generate_report_id(&self) -> ReportId {
        ReportId::from(self.next_ulid())
    }
}
