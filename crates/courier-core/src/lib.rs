//! courier-core
//!
//! Bulk-email dispatch pipeline: a request is accepted as a job, a worker
//! fans it out to the mail gateway in bounded batches, and a completed job
//! leaves behind a delivery report.
//!
//! # Modules
//! - **domain**: ids, requests, job state machine, outcomes, reports, errors
//! - **ports**: JobStore, ReportStore, QueueBroker, DeliveryGateway, Clock, IdGenerator
//! - **app**: submission, controller, dispatcher, workers, read services
//! - **queue**: in-memory at-least-once broker with retry and dead-lettering
//! - **impls**: in-memory stores and gateways (SMTP behind the `smtp` feature)
//! - **config**: environment-driven settings

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{App, AppBuilder};
pub use config::CourierConfig;
pub use domain::{CourierError, JobId, JobStatus, NotificationRequest, ReportId};
