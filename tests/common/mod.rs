//! Shared fixtures for the end-to-end scenario tests: a tempfile-backed
//! Job Store (mirroring `DieselJobStore`'s own unit-test setup) and a
//! scripted `OcrProvider` double for orchestrator-level tests that don't
//! need a real OCR transport.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use diesel_async::SimpleAsyncConnection;

use invoice_extractor::errors::AppError;
use invoice_extractor::ocr::{OcrOutcome, OcrProvider, PdfRef};
use invoice_extractor::repository::{AsyncSqlitePool, DieselJobStore};

/// A fresh tempfile-backed SQLite database, migrated and ready for the
/// Job Store. Leaked for the test's duration so the pool keeps a live
/// path to reopen per operation.
pub async fn test_store() -> DieselJobStore {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.into_path().join("jobs.sqlite3");
    let pool = AsyncSqlitePool::new(&db_path.display().to_string());
    let mut conn = pool.get().await.expect("connect");
    conn.batch_execute(include_str!(
        "../../migrations/2024-01-01-000000_create_jobs/up.sql"
    ))
    .await
    .expect("migrate");
    DieselJobStore::new(pool)
}

/// An `OcrProvider` double that returns a fixed outcome regardless of
/// the `pdf_url`, for orchestrator tests that exercise the LLM stages
/// without a real OCR transport.
pub struct FixedOcrProvider {
    pub markdown: &'static str,
}

#[async_trait]
impl OcrProvider for FixedOcrProvider {
    async fn extract(&self, _pdf_ref: PdfRef) -> Result<OcrOutcome, AppError> {
        Ok(OcrOutcome {
            markdown: self.markdown.to_string(),
            pages: Some(1),
            duration_ms: 5,
            provider: "fixture".to_string(),
        })
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

/// An `OcrProvider` double that reports `PROVIDER_UNKNOWN_DOCTYPE` on
/// its first call (a URL reference) and succeeds on the second (the
/// inline base64 retry), matching the fallback scenario's contract.
pub struct UnknownDoctypeThenOkProvider {
    pub markdown: &'static str,
    calls: AtomicUsize,
}

impl UnknownDoctypeThenOkProvider {
    pub fn new(markdown: &'static str) -> Self {
        Self {
            markdown,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl OcrProvider for UnknownDoctypeThenOkProvider {
    async fn extract(&self, pdf_ref: PdfRef) -> Result<OcrOutcome, AppError> {
        use invoice_extractor::errors::{ErrorKind, Stage};

        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match (n, &pdf_ref) {
            (0, PdfRef::Url(_)) => Err(AppError::new(
                ErrorKind::ProviderUnknownDoctype,
                Stage::Ocr,
                "could not determine the document type",
            )),
            (1, PdfRef::InlineBase64(_)) => Ok(OcrOutcome {
                markdown: self.markdown.to_string(),
                pages: Some(2),
                duration_ms: 8,
                provider: "fixture".to_string(),
            }),
            _ => panic!("unexpected call sequence: call {n} with {pdf_ref:?}"),
        }
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

/// Poll `store.get_job` until it reaches a terminal status or the
/// attempt budget is exhausted, matching the worker pool's own
/// empty-queue backoff cadence.
pub async fn wait_for_terminal(
    store: &dyn invoice_extractor::repository::JobStore,
    job_id: &str,
) -> invoice_extractor::models::Job {
    for _ in 0..200 {
        let job = store.get_job(job_id).await.expect("job exists");
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    panic!("job {job_id} did not reach a terminal status in time");
}
