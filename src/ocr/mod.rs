//! OCR provider abstraction: a uniform PDF -> markdown contract over a
//! hosted OCR backend, plus the URL->bytes fallback policy.

mod fallback;
mod provider;

pub use fallback::{download_pdf_bytes, run_with_url_fallback};
pub use provider::HostedOcrProvider;

use async_trait::async_trait;
use std::sync::LazyLock;

use crate::errors::AppError;
use regex::Regex;

pub const DEFAULT_OCR_TEXT_MAX_BYTES: usize = 1024 * 1024;
pub const DEFAULT_OCR_RETRIEVAL_MAX_BYTES: usize = 256 * 1024;
pub const DEFAULT_MAX_PDF_BYTES: usize = 15 * 1024 * 1024;

/// A reference to the PDF to extract: either the source URL, or an
/// inline base64 payload produced by the URL->bytes fallback.
#[derive(Debug, Clone)]
pub enum PdfRef {
    Url(String),
    InlineBase64(String),
}

#[derive(Debug, Clone)]
pub struct OcrOutcome {
    pub markdown: String,
    pub pages: Option<u32>,
    pub duration_ms: u64,
    pub provider: String,
}

/// A provider that turns a PDF reference into markdown text.
///
/// Implementors perform their own bounded per-attempt retries on
/// `TRANSIENT` errors; the orchestrator separately enforces the 5-minute
/// end-to-end call budget and drives the URL->bytes fallback.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    async fn extract(&self, pdf_ref: PdfRef) -> Result<OcrOutcome, AppError>;
    fn name(&self) -> &str;
}

static ALLOWED_SCHEME: &str = "https";

/// Pre-flight validation of a URL-form PDF reference: scheme must be
/// `https`, host must be in the configured allow-list.
pub fn validate_pdf_url(url: &str, allowed_hosts: &[String]) -> Result<(), AppError> {
    use crate::errors::{ErrorKind, Stage};

    let parsed = url::Url::parse(url)
        .map_err(|e| AppError::validation(Stage::Ocr, format!("invalid pdf_url: {e}")))?;

    if parsed.scheme() != ALLOWED_SCHEME {
        return Err(AppError::validation(
            Stage::Ocr,
            format!("pdf_url scheme must be https, got {}", parsed.scheme()),
        ));
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::validation(Stage::Ocr, "pdf_url has no host"))?;

    if !allowed_hosts.iter().any(|h| h == host) {
        return Err(AppError::new(
            ErrorKind::Validation,
            Stage::Ocr,
            format!("host {host} is not in the allowed PDF host list"),
        ));
    }

    Ok(())
}

static TRUNCATION_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+$").unwrap());

/// Cap `markdown` at `max_bytes` (UTF-8 safe), appending an explicit
/// evidence marker when truncation occurred.
pub fn cap_markdown(markdown: &str, max_bytes: usize) -> String {
    if markdown.len() <= max_bytes {
        return markdown.to_string();
    }
    let marker = "\n\n[...truncated: output exceeded size limit...]";
    let budget = max_bytes.saturating_sub(marker.len());
    let mut end = budget;
    while end > 0 && !markdown.is_char_boundary(end) {
        end -= 1;
    }
    let trimmed = TRUNCATION_MARKER.replace(&markdown[..end], "");
    format!("{trimmed}{marker}")
}
