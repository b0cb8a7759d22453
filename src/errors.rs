//! Shared error taxonomy for the extraction pipeline.
//!
//! Every component classifies its failures into [`ErrorKind`] instead of
//! propagating driver-specific errors, so retry and fail-path decisions in
//! the orchestrator (and in the Job Store's `error_message` column) are
//! made from one place.

use std::fmt;

use regex::Regex;
use std::sync::LazyLock;

/// Which pipeline stage an error originated in, recorded alongside a
/// failed job's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Ocr,
    Llm,
    Store,
    Complete,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Ocr => "OCR",
            Stage::Llm => "LLM",
            Stage::Store => "STORE",
            Stage::Complete => "COMPLETE",
        };
        write!(f, "{s}")
    }
}

/// The uniform error taxonomy from the design's error-handling section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    Quota,
    Timeout,
    Transient,
    /// `VALIDATION` subclass: OCR could not determine the document type
    /// from a URL-form reference, triggering the URL->bytes fallback.
    ProviderUnknownDoctype,
    /// Concurrent advance lost a compare-and-set race on the Job Store.
    Conflict,
    NotFound,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Auth => "AUTH",
            ErrorKind::Quota => "QUOTA",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Transient => "TRANSIENT",
            ErrorKind::ProviderUnknownDoctype => "PROVIDER_UNKNOWN_DOCTYPE",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Whether an error of this kind, having just failed as the given
/// (1-indexed) attempt, should be retried by [`crate::retry::RetryPolicy`].
///
/// `TRANSIENT` is always retryable (subject to the policy's own
/// `max_attempts` cap). `QUOTA` is retried exactly once — treated as
/// transient only when it is the first attempt's failure — since a quota
/// rejection that recurs after backing off once is not going to clear
/// itself.
pub fn is_retryable(kind: ErrorKind, attempt: u32) -> bool {
    match kind {
        ErrorKind::Transient => true,
        ErrorKind::Quota => attempt == 1,
        _ => false,
    }
}

/// An error carrying a classification, the stage it occurred in, and a
/// redacted, display-safe message.
#[derive(Debug)]
pub struct AppError {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl AppError {
    pub fn new(kind: ErrorKind, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn validation(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, stage, message)
    }

    pub fn not_found(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, stage, message)
    }

    pub fn conflict(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, stage, message)
    }

    pub fn timeout(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, stage, message)
    }

    /// `message` with credentials, query-strings, and inline PDF payloads
    /// stripped. Called once at the persistence/logging boundary (the
    /// `Fail` path), not scattered across call sites, per the design's
    /// "redact at the boundary" rule. Truncated to 4 KB, matching the
    /// `jobs.error_message` column cap.
    pub fn redacted_message(&self) -> String {
        truncate_bytes(&redact(&self.message), 4096)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.stage, self.kind, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

static QUERY_STRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?[^\s]*").unwrap());
static BEARER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(bearer|authorization)\s*:?\s*\S+").unwrap());
static DATA_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"data:application/pdf;base64,[A-Za-z0-9+/=]+").unwrap());
static LONG_BASE64: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/]{80,}={0,2}").unwrap());

/// Strip URL query-strings, bearer/authorization tokens, and inline PDF
/// payloads (base64 data-URLs, or long base64-looking runs) from a
/// free-text message before it is stored or logged.
pub fn redact(message: &str) -> String {
    let out = DATA_URL.replace_all(message, "[redacted-pdf-data]");
    let out = BEARER_TOKEN.replace_all(&out, "[redacted-credential]");
    let out = QUERY_STRING.replace_all(&out, "?[redacted]");
    let out = LONG_BASE64.replace_all(&out, "[redacted]");
    out.into_owned()
}

pub fn truncate_bytes(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
