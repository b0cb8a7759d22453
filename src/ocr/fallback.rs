//! URL->bytes fallback: when the OCR provider cannot resolve a document
//! type from a bare URL, the caller downloads the PDF itself and retries
//! once with an inline base64 payload.

use base64::Engine;
use reqwest::Client;
use std::time::Duration;

use super::{OcrOutcome, OcrProvider, PdfRef, DEFAULT_MAX_PDF_BYTES};
use crate::errors::{AppError, ErrorKind, Stage};
use crate::retry::RetryPolicy;

const DOWNLOAD_BUDGET: Duration = Duration::from_secs(45);

/// Download the PDF at `url`, enforcing `max_bytes` and the shared
/// backoff schedule, within a 45s total budget.
pub async fn download_pdf_bytes(
    client: &Client,
    url: &str,
    max_bytes: usize,
) -> Result<Vec<u8>, AppError> {
    let retry = RetryPolicy::default();
    let fetch = retry.run(|| async {
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_download_error(&e))?;

        if !resp.status().is_success() {
            return Err(classify_status(resp.status().as_u16()));
        }

        if let Some(len) = resp.content_length() {
            if len as usize > max_bytes {
                return Err(AppError::validation(
                    Stage::Ocr,
                    format!("pdf exceeds maximum download size of {max_bytes} bytes"),
                ));
            }
        }

        let bytes = resp.bytes().await.map_err(|e| classify_download_error(&e))?;
        if bytes.len() > max_bytes {
            return Err(AppError::validation(
                Stage::Ocr,
                format!("pdf exceeds maximum download size of {max_bytes} bytes"),
            ));
        }

        Ok(bytes.to_vec())
    });

    tokio::time::timeout(DOWNLOAD_BUDGET, fetch)
        .await
        .map_err(|_| AppError::timeout(Stage::Ocr, "pdf download exceeded 45s budget"))?
}

fn classify_download_error(e: &reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::new(ErrorKind::Timeout, Stage::Ocr, e.to_string())
    } else {
        AppError::new(ErrorKind::Transient, Stage::Ocr, e.to_string())
    }
}

fn classify_status(status: u16) -> AppError {
    match status {
        401 | 403 => AppError::new(ErrorKind::Auth, Stage::Ocr, format!("download rejected: HTTP {status}")),
        429 => AppError::new(ErrorKind::Quota, Stage::Ocr, format!("download rejected: HTTP {status}")),
        s if (500..600).contains(&s) => {
            AppError::new(ErrorKind::Transient, Stage::Ocr, format!("download failed: HTTP {s}"))
        }
        s => AppError::validation(Stage::Ocr, format!("download failed: HTTP {s}")),
    }
}

/// Drive a single OCR call against a URL reference, falling back to a
/// downloaded-bytes retry exactly once when the provider reports
/// `PROVIDER_UNKNOWN_DOCTYPE`. Any other error class is returned as-is.
pub async fn run_with_url_fallback(
    provider: &dyn OcrProvider,
    http: &Client,
    pdf_url: &str,
    max_pdf_bytes: usize,
) -> Result<OcrOutcome, AppError> {
    match provider.extract(PdfRef::Url(pdf_url.to_string())).await {
        Ok(outcome) => Ok(outcome),
        Err(e) if e.kind == ErrorKind::ProviderUnknownDoctype => {
            tracing::info!(provider = provider.name(), "falling back to bytes after unknown doctype");
            let bytes = download_pdf_bytes(http, pdf_url, max_pdf_bytes).await?;
            let data_url = format!(
                "data:application/pdf;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(&bytes)
            );
            provider.extract(PdfRef::InlineBase64(data_url)).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyThenOkProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrProvider for FlakyThenOkProvider {
        async fn extract(&self, pdf_ref: PdfRef) -> Result<OcrOutcome, AppError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            match (n, &pdf_ref) {
                (0, PdfRef::Url(_)) => Err(AppError::new(
                    ErrorKind::ProviderUnknownDoctype,
                    Stage::Ocr,
                    "could not determine document type",
                )),
                (1, PdfRef::InlineBase64(_)) => Ok(OcrOutcome {
                    markdown: "ok".to_string(),
                    pages: Some(1),
                    duration_ms: 1,
                    provider: "flaky".to_string(),
                }),
                _ => panic!("unexpected call sequence"),
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    struct AlwaysValidationProvider;

    #[async_trait]
    impl OcrProvider for AlwaysValidationProvider {
        async fn extract(&self, _pdf_ref: PdfRef) -> Result<OcrOutcome, AppError> {
            Err(AppError::validation(Stage::Ocr, "bad pdf"))
        }

        fn name(&self) -> &str {
            "always-validation"
        }
    }

    #[tokio::test]
    async fn non_unknown_doctype_errors_do_not_trigger_fallback() {
        let provider = AlwaysValidationProvider;
        let client = Client::new();
        let err = run_with_url_fallback(&provider, &client, "https://example.com/a.pdf", DEFAULT_MAX_PDF_BYTES)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn classify_status_maps_rate_limit_to_quota() {
        let err = classify_status(429);
        assert_eq!(err.kind, ErrorKind::Quota);
    }
}
