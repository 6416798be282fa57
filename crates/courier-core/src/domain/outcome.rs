//! Per-recipient delivery outcomes.
//!
//! Only the binary result is persisted. The gateway's failure reason goes to
//! the log, not into the job record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::recipient::Recipient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Success,
    Failure,
}

impl DeliveryOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, DeliveryOutcome::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryOutcome::Success => "success",
            DeliveryOutcome::Failure => "failure",
        }
    }
}

impl<E> From<&Result<(), E>> for DeliveryOutcome {
    fn from(result: &Result<(), E>) -> Self {
        if result.is_ok() {
            DeliveryOutcome::Success
        } else {
            DeliveryOutcome::Failure
        }
    }
}

/// Outcome map produced by one dispatch run. Order-independent.
pub type OutcomeMap = HashMap<Recipient, DeliveryOutcome>;

/// Success / failure tallies over an outcome map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounts {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
}

impl OutcomeCounts {
    pub fn tally<'a>(outcomes: impl IntoIterator<Item = &'a DeliveryOutcome>) -> Self {
        outcomes
            .into_iter()
            .fold(Self::default(), |mut counts, outcome| {
                counts.total += 1;
                match outcome {
                    DeliveryOutcome::Success => counts.success += 1,
                    DeliveryOutcome::Failure => counts.failure += 1,
                }
                counts
            })
    }
}
