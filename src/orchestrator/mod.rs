//! Workflow orchestrator: drives each job through
//! `Queued -> Analyzing -> Extracting -> Verifying -> (Completed | Failed)`,
//! pooling workers the way the teacher's download service pools
//! crawl-claim workers.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::{AppError, ErrorKind, Stage};
use crate::extraction::ExtractionService;
use crate::models::reasoned_field::Confidence;
use crate::models::{Job, JobResult, ProcessingPhase};
use crate::ocr::{run_with_url_fallback, validate_pdf_url, cap_markdown, OcrProvider};
use crate::repository::JobStore;
use crate::retry::RetryPolicy;

/// No queued work was found; how long a worker sleeps before re-polling.
const EMPTY_QUEUE_BACKOFF: Duration = Duration::from_millis(250);

const OCR_BUDGET: Duration = Duration::from_secs(5 * 60);
const LLM_BUDGET: Duration = Duration::from_secs(15 * 60);
const STORE_WRITE_BUDGET: Duration = Duration::from_secs(60);
const JOB_CEILING: Duration = Duration::from_secs(30 * 60);

pub struct OrchestratorConfig {
    pub allowed_pdf_hosts: Vec<String>,
    pub ocr_text_max_bytes: usize,
    pub max_pdf_bytes: usize,
}

/// Owns the shared dependencies a worker pool drives jobs through. Cheap
/// to clone: every field is an `Arc` or plain config data.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    ocr: Arc<dyn OcrProvider>,
    http: reqwest::Client,
    extraction: Arc<ExtractionService>,
    config: Arc<OrchestratorConfig>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        ocr: Arc<dyn OcrProvider>,
        http: reqwest::Client,
        extraction: ExtractionService,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            ocr,
            http,
            extraction: Arc::new(extraction),
            config: Arc::new(config),
        }
    }

    /// Spawn `concurrency` worker tasks, each looping: claim the oldest
    /// queued job, drive it through S1-S4, then loop. A worker that finds
    /// no queued work backs off briefly before re-polling. Runs until the
    /// process is terminated; callers manage the `JoinHandle`s.
    pub fn run_worker_pool(&self, concurrency: usize) -> Vec<tokio::task::JoinHandle<()>> {
        (0..concurrency)
            .map(|worker_id| {
                let orchestrator = self.clone();
                tokio::spawn(async move { orchestrator.worker_loop(worker_id).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_id: usize) {
        loop {
            match self.store.claim_next_queued().await {
                Ok(Some(job)) => self.drive_job(worker_id, job).await,
                Ok(None) => tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await,
                Err(e) => {
                    tracing::warn!(worker_id, error = %e, "claim_next_queued failed");
                    tokio::time::sleep(EMPTY_QUEUE_BACKOFF).await;
                }
            }
        }
    }

    /// Drive one claimed job through S1-S4, under a single outer 30-minute
    /// ceiling. `CONFLICT` (another worker already moved the job) is the
    /// "loser drops its work" case: log at debug and return without a
    /// fail write, since the job is no longer this worker's to fail.
    async fn drive_job(&self, worker_id: usize, job: Job) {
        let job_id = job.id.clone();
        let outcome = tokio::time::timeout(JOB_CEILING, self.run_stages(&job)).await;

        match outcome {
            Ok(Ok(())) => {
                tracing::info!(worker_id, job_id, outcome = "completed", "job finished");
            }
            Ok(Err(e)) if e.kind == ErrorKind::Conflict => {
                tracing::debug!(worker_id, job_id, "lost compare-and-set race, dropping job");
            }
            Ok(Err(e)) => self.fail(worker_id, &job_id, e).await,
            Err(_) => {
                self.fail(
                    worker_id,
                    &job_id,
                    AppError::timeout(Stage::Complete, "job exceeded its 30-minute ceiling"),
                )
                .await
            }
        }
    }

    async fn fail(&self, worker_id: usize, job_id: &str, error: AppError) {
        tracing::warn!(worker_id, job_id, stage = %error.stage, kind = %error.kind, "job failed");
        if let Err(store_err) = self.store.fail_job(job_id, &error.redacted_message()).await {
            tracing::warn!(worker_id, job_id, error = %store_err, "failed to persist failure");
        }
    }

    async fn run_stages(&self, job: &Job) -> Result<(), AppError> {
        validate_pdf_url(&job.pdf_url, &self.config.allowed_pdf_hosts)?;

        // S1: Analyzing - OCR, under its own 5-minute budget.
        let ocr_outcome = tokio::time::timeout(
            OCR_BUDGET,
            run_with_url_fallback(
                self.ocr.as_ref(),
                &self.http,
                &job.pdf_url,
                self.config.max_pdf_bytes,
            ),
        )
        .await
        .map_err(|_| AppError::timeout(Stage::Ocr, "OCR call exceeded its 5-minute budget"))??;

        let markdown = cap_markdown(&ocr_outcome.markdown, self.config.ocr_text_max_bytes);

        // S1 -> S2: Extracting - LLM classify+extract, under a 15-minute budget.
        self.set_phase(job, ProcessingPhase::ExtractingData).await?;
        let extraction = tokio::time::timeout(LLM_BUDGET, self.extraction.extract(&markdown))
            .await
            .map_err(|_| AppError::timeout(Stage::Llm, "LLM extraction exceeded its 15-minute budget"))??;

        // S2 -> S3: Verifying - deterministic sanity checks already ran
        // inside ExtractionService::extract; this phase exists so pollers
        // observe it even though no further work happens here.
        self.set_phase(job, ProcessingPhase::VerifyingData).await?;

        let confidence_score = compute_confidence_score(&extraction.invoice);
        let extracted_data = serde_json::to_value(&extraction.invoice)
            .map_err(|e| AppError::validation(Stage::Complete, format!("failed to serialize extracted invoice: {e}")))?;

        let result = JobResult {
            job_id: job.id.clone(),
            extracted_data,
            confidence_score: Some(confidence_score),
            tokens_used: extraction.tokens_used,
            raw_ocr_text: markdown,
            ocr_provider: ocr_outcome.provider,
            ocr_duration_ms: ocr_outcome.duration_ms,
            ocr_pages: ocr_outcome.pages,
            created_at: chrono::Utc::now(),
        };

        // S3 -> S4: Complete, under the store's 1-minute write budget, each
        // attempt retried on TRANSIENT per the shared store-task policy.
        tokio::time::timeout(
            STORE_WRITE_BUDGET,
            RetryPolicy::default().run(|| async { self.store.complete_job(&job.id, &result).await.map_err(AppError::from) }),
        )
        .await
        .map_err(|_| AppError::timeout(Stage::Store, "store write exceeded its 1-minute budget"))?
    }

    async fn set_phase(&self, job: &Job, phase: ProcessingPhase) -> Result<(), AppError> {
        tokio::time::timeout(
            STORE_WRITE_BUDGET,
            RetryPolicy::default().run(|| async { self.store.set_phase(&job.id, phase).await.map_err(AppError::from) }),
        )
        .await
        .map_err(|_| AppError::timeout(Stage::Store, "store write exceeded its 1-minute budget"))?
    }
}

/// Global confidence: the majority vote across every base-level
/// `ReasonedField`'s confidence, mapped `high -> 1.0`, `medium -> 0.6`,
/// `low -> 0.2`. Ties fall through to the lowest bucket (a
/// high/medium/low three-way split with no majority reports `0.2`, not
/// `1.0` or `0.6`), since the rule is "majority of explicitly labelled
/// fields", not "any".
fn compute_confidence_score(invoice: &crate::models::ExtractedInvoice) -> f64 {
    let base = invoice.base();
    let confidences = [
        base.invoice_date.confidence,
        base.invoice_due_date.confidence,
        base.invoice_number.confidence,
        base.account_number.confidence,
        base.vendor_name.confidence,
        base.community_name.confidence,
        base.payment_remittance_entity.confidence,
        base.payment_remittance_entity_care_of.confidence,
        base.payment_remittance_address.confidence,
        base.total_amount_due.confidence,
        base.invoice_current_due_amount.confidence,
        base.invoice_past_due_amount.confidence,
        base.invoice_late_fee_amount.confidence,
        base.credit_amount.confidence,
    ];

    let total = confidences.len();
    let high = confidences.iter().filter(|c| **c == Confidence::High).count();
    let medium = confidences.iter().filter(|c| **c == Confidence::Medium).count();

    if high * 2 > total {
        1.0
    } else if medium * 2 > total {
        0.6
    } else {
        0.2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reasoned_field::ReasonCode;
    use crate::models::{ExtractedInvoice, InvoiceBase, ReasonedField};

    fn base_with_confidences(confidences: [Confidence; 14]) -> InvoiceBase {
        let field = |c: Confidence| ReasonedField {
            value: Some("x".to_string()),
            confidence: c,
            reason_code: ReasonCode::ExplicitLabel,
            evidence_snippet: None,
            reasoning: None,
            assumptions: None,
        };
        let money_field = |c: Confidence| ReasonedField {
            value: Some(0.0_f64),
            confidence: c,
            reason_code: ReasonCode::ExplicitLabel,
            evidence_snippet: None,
            reasoning: None,
            assumptions: None,
        };
        InvoiceBase {
            invoice_date: field(confidences[0]),
            invoice_due_date: field(confidences[1]),
            invoice_number: field(confidences[2]),
            account_number: field(confidences[3]),
            vendor_name: field(confidences[4]),
            community_name: field(confidences[5]),
            payment_remittance_entity: field(confidences[6]),
            payment_remittance_entity_care_of: field(confidences[7]),
            payment_remittance_address: field(confidences[8]),
            total_amount_due: money_field(confidences[9]),
            invoice_current_due_amount: money_field(confidences[10]),
            invoice_past_due_amount: money_field(confidences[11]),
            invoice_late_fee_amount: money_field(confidences[12]),
            credit_amount: money_field(confidences[13]),
            reasoning: String::new(),
            valid_input: true,
        }
    }

    #[test]
    fn majority_high_scores_one() {
        let base = base_with_confidences([Confidence::High; 14]);
        let score = compute_confidence_score(&ExtractedInvoice::General(base));
        assert_eq!(score, 1.0);
    }

    #[test]
    fn majority_medium_scores_point_six() {
        let mut confidences = [Confidence::Medium; 14];
        confidences[0] = Confidence::Low;
        let base = base_with_confidences(confidences);
        let score = compute_confidence_score(&ExtractedInvoice::General(base));
        assert_eq!(score, 0.6);
    }

    #[test]
    fn no_majority_scores_point_two() {
        let mut confidences = [Confidence::Low; 14];
        confidences[0] = Confidence::High;
        confidences[1] = Confidence::High;
        confidences[2] = Confidence::High;
        confidences[3] = Confidence::Medium;
        confidences[4] = Confidence::Medium;
        confidences[5] = Confidence::Medium;
        let base = base_with_confidences(confidences);
        let score = compute_confidence_score(&ExtractedInvoice::General(base));
        assert_eq!(score, 0.2);
    }
}
