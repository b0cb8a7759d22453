//! Environment-sourced configuration.
//!
//! Deliberately plain `std::env` reads rather than the teacher's `prefer`
//! config-file layer: this crate has a small, flat key set with no nested
//! document structure or file-format negotiation to justify it.

use crate::errors::{AppError, Stage};
use crate::ocr::{DEFAULT_MAX_PDF_BYTES, DEFAULT_OCR_RETRIEVAL_MAX_BYTES, DEFAULT_OCR_TEXT_MAX_BYTES};

#[derive(Debug, Clone)]
pub struct Settings {
    pub ocr_provider: String,
    pub ocr_endpoint: String,
    pub ocr_api_key: String,
    pub allowed_pdf_hosts: Vec<String>,
    pub ocr_text_max_bytes: usize,
    pub ocr_retrieval_max_bytes: usize,
    pub max_pdf_bytes: usize,
    pub llm_endpoint: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_temperature: f32,
    pub database_url: String,
}

fn required(key: &str) -> Result<String, AppError> {
    std::env::var(key)
        .map_err(|_| AppError::validation(Stage::Complete, format!("missing required environment variable {key}")))
}

fn optional_usize(key: &str, default: usize) -> Result<usize, AppError> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| AppError::validation(Stage::Complete, format!("{key} must be a positive integer"))),
        Err(_) => Ok(default),
    }
}

fn optional_f32(key: &str, default: f32) -> Result<f32, AppError> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| AppError::validation(Stage::Complete, format!("{key} must be a number"))),
        Err(_) => Ok(default),
    }
}

impl Settings {
    /// Load `.env` (if present, via the same `dotenvy::dotenv()` idiom the
    /// binary entry point uses) then read the documented environment
    /// keys. Missing required keys fail with `VALIDATION` naming the
    /// missing key, never a panic.
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let allowed_pdf_hosts = required("ALLOWED_PDF_HOSTS")?
            .split(',')
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect::<Vec<_>>();

        if allowed_pdf_hosts.is_empty() {
            return Err(AppError::validation(
                Stage::Complete,
                "ALLOWED_PDF_HOSTS must list at least one host",
            ));
        }

        Ok(Self {
            ocr_provider: std::env::var("OCR_PROVIDER").unwrap_or_else(|_| "hosted".to_string()),
            ocr_endpoint: required("OCR_ENDPOINT")?,
            ocr_api_key: required("OCR_API_KEY")?,
            allowed_pdf_hosts,
            ocr_text_max_bytes: optional_usize("OCR_TEXT_MAX_BYTES", DEFAULT_OCR_TEXT_MAX_BYTES)?,
            ocr_retrieval_max_bytes: optional_usize(
                "OCR_RETRIEVAL_MAX_BYTES",
                DEFAULT_OCR_RETRIEVAL_MAX_BYTES,
            )?,
            max_pdf_bytes: optional_usize("MAX_PDF_BYTES", DEFAULT_MAX_PDF_BYTES)?,
            llm_endpoint: required("LLM_ENDPOINT")?,
            llm_api_key: required("LLM_API_KEY")?,
            llm_model: required("LLM_MODEL")?,
            llm_temperature: optional_f32("LLM_TEMPERATURE", crate::extraction::DEFAULT_TEMPERATURE)?,
            database_url: std::env::var("DATABASE_URL").unwrap_or_else(|_| "jobs.sqlite3".to_string()),
        })
    }
}
