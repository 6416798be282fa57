//! Job record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::InvalidTransition;
use super::ids::JobId;
use super::outcome::{OutcomeCounts, OutcomeMap};
use super::recipient::Recipient;
use super::request::Message;
use super::state::JobStatus;

/// Durable record of one dispatch job.
///
/// Status changes go through `transition`, which validates the edge against
/// the state machine. The outcome map is only ever replaced as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub recipients: Vec<Recipient>,
    pub subject: String,
    pub body: String,
    pub status: JobStatus,

    /// Absent entries mean "not yet attempted".
    #[serde(default)]
    pub outcomes: OutcomeMap,

    /// Number of times a worker moved this job into Processing.
    pub runs: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: JobId, message: Message, now: DateTime<Utc>) -> Self {
        Self {
            id,
            recipients: message.recipients,
            subject: message.subject,
            body: message.body,
            status: JobStatus::Queued,
            outcomes: OutcomeMap::new(),
            runs: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, rejecting illegal edges.
    pub fn transition(
        &mut self,
        next: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        self.status = self.status.transition_to(next)?;
        if next == JobStatus::Processing {
            self.runs += 1;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Every recipient has an outcome.
    pub fn outcomes_complete(&self) -> bool {
        self.outcomes.len() == self.recipients.len()
            && self.recipients.iter().all(|r| self.outcomes.contains_key(r))
    }

    pub fn counts(&self) -> OutcomeCounts {
        OutcomeCounts::tally(self.outcomes.values())
    }
}
