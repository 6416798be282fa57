//! Queue module: delivery state, retry policy, and the in-memory broker.
//!
//! # Delivery guarantees
//! The broker delivers each job **at least once**. A job leaves the broker
//! only by being acknowledged or dead-lettered.
//!
//! - **Lease**: a worker claims a job for `lease_timeout` and renews the claim
//!   while it works (`JobLease::extend`)
//! - **Expiry**: a claim that is not renewed is taken back and the job becomes
//!   ready again, counted as another delivery
//! - **Retry**: a worker that hands the job back gets it again after an
//!   exponential backoff from `RetryPolicy`
//! - **Dead letter**: after `max_deliveries` the job is parked as `Dead` and
//!   reported once through `drain_dead`
//!
//! # Who owns what
//! The broker tracks who holds a job. It never reads or writes the job record.
//! Marking a dead-lettered job `failed` is the reaper's job (`app::worker`).
//!
//! # Module layout
//! - `state`: `DeliveryState` and its transitions
//! - `record`: per-job bookkeeping (`DeliveryRecord`)
//! - `retry`: backoff calculation
//! - `memory`: `InMemoryBroker`, the single-process implementation

mod memory;
mod record;
mod retry;
mod state;

pub use memory::{BrokerSettings, InMemoryBroker};
pub use record::DeliveryRecord;
pub use retry::RetryPolicy;
pub use state::DeliveryState;
