//! `JobResult` — the durable output of a completed extraction job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw OCR text is capped before being persisted or returned from
/// `GET /jobs/:id/ocr`, independent of whatever limit the OCR provider
/// itself enforces.
pub const MAX_RAW_OCR_TEXT_BYTES: usize = 2_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub extracted_data: serde_json::Value,
    pub confidence_score: Option<f64>,
    pub tokens_used: u64,
    pub raw_ocr_text: String,
    pub ocr_provider: String,
    pub ocr_duration_ms: u64,
    pub ocr_pages: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl JobResult {
    /// `confidence_score` must be `None` or within `[0, 1]`.
    pub fn confidence_in_range(&self) -> bool {
        match self.confidence_score {
            Some(c) => (0.0..=1.0).contains(&c),
            None => true,
        }
    }
}
