//! Impls - port implementations for development, tests, and the CLI.
//!
//! - **InMemoryJobStore / InMemoryReportStore**: document stores with fault
//!   injection
//! - **LoggingGateway**: logs instead of sending
//! - **ScriptedGateway**: programmable failures, delays, and hangs
//! - **SmtpGateway** (`smtp` feature): real relay via lettre
//!
//! The in-memory broker lives in `crate::queue`.

pub mod gateway;
pub mod memory_store;
#[cfg(feature = "smtp")]
pub mod smtp;

pub use self::gateway::{LoggingGateway, ScriptedGateway};
pub use self::memory_store::{InMemoryJobStore, InMemoryReportStore, StoreOp};
#[cfg(feature = "smtp")]
pub use self::smtp::{SmtpGateway, SmtpGatewayBuilder};
