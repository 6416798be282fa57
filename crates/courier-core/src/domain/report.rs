//! Delivery report: the immutable summary written once a job completes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{JobId, ReportId};
use super::job::JobRecord;
use super::outcome::{DeliveryOutcome, OutcomeCounts};
use super::recipient::Recipient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub recipient: Recipient,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub job_id: JobId,
    pub subject: String,
    pub total_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Same order as the job's recipient list.
    pub rows: Vec<ReportRow>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Build the report for a job whose outcome map is complete.
    ///
    /// Returns `None` if any recipient is missing an outcome: a report is only
    /// ever produced from a fully recorded job.
    pub fn from_job(id: ReportId, job: &JobRecord, now: DateTime<Utc>) -> Option<Self> {
        if !job.outcomes_complete() {
            return None;
        }

        let rows: Vec<ReportRow> = job
            .recipients
            .iter()
            .map(|recipient| ReportRow {
                recipient: recipient.clone(),
                outcome: job.outcomes[recipient],
            })
            .collect();
        let counts = OutcomeCounts::tally(rows.iter().map(|row| &row.outcome));

        Some(Self {
            id,
            job_id: job.id,
            subject: job.subject.clone(),
            total_count: counts.total,
            success_count: counts.success,
            failure_count: counts.failure,
            rows,
            created_at: now,
        })
    }

    pub fn counts(&self) -> OutcomeCounts {
        OutcomeCounts {
            total: self.total_count,
            success: self.success_count,
            failure: self.failure_count,
        }
    }
}

/// One exported line. Field order is the column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub job_id: JobId,
    pub recipient: Recipient,
    pub outcome: DeliveryOutcome,
    pub subject: String,
}

impl ExportRow {
    pub const COLUMNS: [&'static str; 4] = ["job_id", "recipient", "outcome", "subject"];

    /// Cell values in `COLUMNS` order.
    pub fn cells(&self) -> [String; 4] {
        [
            self.job_id.to_string(),
            self.recipient.to_string(),
            self.outcome.as_str().to_string(),
            self.subject.clone(),
        ]
    }
}

/// Tabular export of a report, handed to an external formatter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportExport {
    pub report_id: ReportId,
    pub job_id: JobId,
    pub counts: OutcomeCounts,
    pub rows: Vec<ExportRow>,
}

impl From<&Report> for ReportExport {
    fn from(report: &Report) -> Self {
        Self {
            report_id: report.id,
            job_id: report.job_id,
            counts: report.counts(),
            rows: report
                .rows
                .iter()
                .map(|row| ExportRow {
                    job_id: report.job_id,
                    recipient: row.recipient.clone(),
                    outcome: row.outcome,
                    subject: report.subject.clone(),
                })
                .collect(),
        }
    }
}
