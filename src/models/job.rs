//! Job and job-status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lattice position of a job: `Queued -> Processing -> (Completed | Failed)`.
/// `Failed` and `Completed` are both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Intra-`processing` sub-status. Transitions within processing are
/// monotone in the order listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPhase {
    AnalyzingInvoice,
    ExtractingData,
    VerifyingData,
}

impl ProcessingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalyzingInvoice => "analyzing_invoice",
            Self::ExtractingData => "extracting_data",
            Self::VerifyingData => "verifying_data",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "analyzing_invoice" => Some(Self::AnalyzingInvoice),
            "extracting_data" => Some(Self::ExtractingData),
            "verifying_data" => Some(Self::VerifyingData),
            _ => None,
        }
    }
}

/// One invoice-extraction job, as persisted by the Job Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub client_id: Option<String>,
    pub status: JobStatus,
    pub processing_phase: Option<ProcessingPhase>,
    pub pdf_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Generate a new opaque, time-ordered, URL-safe job id (UUIDv7).
pub fn new_job_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

pub const MAX_PDF_URL_LEN: usize = 2048;
pub const MAX_CLIENT_ID_LEN: usize = 50;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_roundtrip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn phase_ordering_is_monotone() {
        assert!(ProcessingPhase::AnalyzingInvoice < ProcessingPhase::ExtractingData);
        assert!(ProcessingPhase::ExtractingData < ProcessingPhase::VerifyingData);
    }

    #[test]
    fn job_ids_are_unique_and_time_ordered() {
        let a = new_job_id();
        let b = new_job_id();
        assert_ne!(a, b);
        // UUIDv7's timestamp occupies the most-significant bits, so two ids
        // generated in sequence sort lexicographically by creation order.
        assert!(a < b);
    }
}
