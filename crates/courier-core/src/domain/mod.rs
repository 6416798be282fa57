//! Domain model: identifiers, job state machine, outcomes, reports, errors.
//!
//! Nothing in here performs I/O. Ports and application services build on
//! these types.

pub mod errors;
pub mod ids;
pub mod job;
pub mod outcome;
pub mod recipient;
pub mod report;
pub mod request;
pub mod state;

pub use self::errors::{
    ConfigError, CourierError, ErrorKind, GatewayError, InvalidTransition, QueueError,
    StoreError, ValidationError,
};
pub use self::ids::{JobId, ParseIdError, ReportId};
pub use self::job::JobRecord;
pub use self::outcome::{DeliveryOutcome, OutcomeCounts, OutcomeMap};
pub use self::recipient::Recipient;
pub use self::report::{ExportRow, Report, ReportExport, ReportRow};
pub use self::request::{DEFAULT_SUBJECT, Message, NotificationRequest};
pub use self::state::JobStatus;
