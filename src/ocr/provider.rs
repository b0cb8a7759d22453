//! The single concrete OCR provider: a hosted HTTP OCR service.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::{OcrOutcome, OcrProvider, PdfRef};
use crate::errors::{AppError, ErrorKind, Stage};
use crate::retry::RetryPolicy;

#[derive(Debug, Serialize)]
struct HostedOcrRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct HostedOcrResponse {
    markdown: String,
    pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HostedOcrErrorBody {
    #[serde(default)]
    message: String,
}

/// OCR provider backed by a hosted HTTP service reachable at
/// `OCR_ENDPOINT`, authenticated with `OCR_API_KEY`.
pub struct HostedOcrProvider {
    name: String,
    endpoint: String,
    api_key: String,
    client: Client,
    retry: RetryPolicy,
}

impl HostedOcrProvider {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .expect("failed to build OCR HTTP client");

        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client,
            retry: RetryPolicy::default(),
        }
    }

    async fn call_once(&self, pdf_ref: &PdfRef) -> Result<(String, Option<u32>), AppError> {
        let request = match pdf_ref {
            PdfRef::Url(url) => HostedOcrRequest {
                url: Some(url),
                data: None,
            },
            PdfRef::InlineBase64(data) => HostedOcrRequest {
                url: None,
                data: Some(data),
            },
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        if status.is_success() {
            let body: HostedOcrResponse = resp
                .json()
                .await
                .map_err(|e| AppError::new(ErrorKind::Unknown, Stage::Ocr, format!("malformed OCR response: {e}")))?;
            return Ok((body.markdown, body.pages));
        }

        let body = resp
            .json::<HostedOcrErrorBody>()
            .await
            .unwrap_or(HostedOcrErrorBody {
                message: format!("OCR provider returned HTTP {status}"),
            });

        Err(classify_status_error(status, body.message))
    }
}

fn classify_transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::new(ErrorKind::Timeout, Stage::Ocr, e.to_string())
    } else {
        AppError::new(ErrorKind::Transient, Stage::Ocr, e.to_string())
    }
}

fn classify_status_error(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            AppError::new(ErrorKind::Auth, Stage::Ocr, message)
        }
        StatusCode::TOO_MANY_REQUESTS => AppError::new(ErrorKind::Quota, Stage::Ocr, message),
        StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
            if message.to_lowercase().contains("could not determine the document type") {
                AppError::new(ErrorKind::ProviderUnknownDoctype, Stage::Ocr, message)
            } else {
                AppError::validation(Stage::Ocr, message)
            }
        }
        s if s.is_server_error() => AppError::new(ErrorKind::Transient, Stage::Ocr, message),
        _ => AppError::new(ErrorKind::Unknown, Stage::Ocr, message),
    }
}

#[async_trait]
impl OcrProvider for HostedOcrProvider {
    async fn extract(&self, pdf_ref: PdfRef) -> Result<OcrOutcome, AppError> {
        let start = Instant::now();
        let pdf_ref_for_log = match &pdf_ref {
            PdfRef::Url(_) => "url",
            PdfRef::InlineBase64(_) => "inline_base64",
        };

        let mut attempt = 0u32;
        let result = self
            .retry
            .run(|| {
                attempt += 1;
                let pdf_ref = &pdf_ref;
                async move { self.call_once(pdf_ref).await }
            })
            .await;

        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok((markdown, pages)) => {
                tracing::info!(
                    provider = %self.name,
                    attempt,
                    duration_ms,
                    pages,
                    decision = "ok",
                    pdf_ref = pdf_ref_for_log,
                    "ocr extraction succeeded"
                );
                Ok(OcrOutcome {
                    markdown,
                    pages,
                    duration_ms,
                    provider: self.name.clone(),
                })
            }
            Err(e) => {
                tracing::warn!(
                    provider = %self.name,
                    attempt,
                    duration_ms,
                    kind = %e.kind,
                    decision = "error",
                    pdf_ref = pdf_ref_for_log,
                    "ocr extraction failed"
                );
                Err(e)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
