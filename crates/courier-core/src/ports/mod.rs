//! Ports - the boundaries the pipeline talks through.
//!
//! Each trait stands for an external system (mail transport, document store,
//! queue broker). `impls` provides in-memory versions used by tests and the
//! CLI; production adapters plug in behind the same traits.

pub mod clock;
pub mod gateway;
pub mod id_generator;
pub mod job_store;
pub mod queue;
pub mod report_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::gateway::DeliveryGateway;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::JobStore;
pub use self::queue::{JobLease, QueueBroker};
pub use self::report_store::ReportStore;
