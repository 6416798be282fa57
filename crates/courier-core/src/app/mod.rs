//! App - application layer.
//!
//! Combines the ports into the dispatch pipeline.
//!
//! - **SubmissionService**: validate, persist, enqueue
//! - **JobController**: job lifecycle around one broker delivery
//! - **BatchDispatcher**: bounded concurrent fan-out of one message
//! - **WorkerGroup**: lease loop feeding the controller
//! - **ReportService** / **StatusService**: read side
//! - **AppBuilder**: wiring and start-up validation

pub mod builder;
pub mod controller;
pub mod dispatcher;
pub mod reports;
pub mod status;
pub mod submission;
pub mod worker;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::controller::{Disposition, JobController};
pub use self::dispatcher::{BatchDispatcher, DispatchSettings};
pub use self::reports::ReportService;
pub use self::status::{JobStatusView, StatusService};
pub use self::submission::SubmissionService;
pub use self::worker::WorkerGroup;
