//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID-based ids with one generic implementation
//! Every identifier is a ULID (Universally Unique Lexicographically Sortable
//! Identifier) wrapped in `Id<T>`.
//!
//! ## ULID properties
//! - **Sortable by time**: the timestamp comes first, so ids sort in creation order
//! - **Generated anywhere**: no coordination between nodes or workers
//! - **128-bit**: same size as a UUID
//!
//! ## Phantom type
//! `T` only exists at compile time (`PhantomData`). `JobId` and `ReportId`
//! share every line of code and still cannot be mixed up: a report lookup
//! that is handed a job id does not compile.
//!
//! ## Textual forms
//! - `Display` writes `<prefix><ulid>`, e.g. `job-01HV...`
//! - `FromStr` accepts the prefixed form or a bare ULID
//! - serde writes the bare ULID, so stored records do not repeat the prefix
//!
//! A bare ULID parses as any id kind. Report lookup relies on that when it
//! tries one key as a report id and then as a job id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use thiserror::Error;
use ulid::Ulid;

/// Marker trait for each identifier kind.
pub trait IdMarker: Send + Sync + 'static {
    /// Prefix used by `Display` and accepted by `FromStr` (e.g. `"job-"`).
    fn prefix() -> &'static str;
}

/// Generic identifier.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Returned when a string is not a valid identifier of the requested kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identifier `{input}` (expected `{prefix}<ulid>`)")]
pub struct ParseIdError {
    pub input: String,
    pub prefix: &'static str,
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    /// Accepts both the prefixed form and a bare ULID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| ParseIdError {
                input: s.to_string(),
                prefix: T::prefix(),
            })
    }
}

/// Marker for dispatch jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "job-"
    }
}

/// Marker for delivery reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Report {}

impl IdMarker for Report {
    fn prefix() -> &'static str {
        "report-"
    }
}

/// Identifier of a dispatch job (submission / status / report unit).
pub type JobId = Id<Job>;

/// Identifier of a delivery report.
pub type ReportId = Id<Report>;
