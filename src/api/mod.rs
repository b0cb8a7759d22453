//! Read/submit API surface: thin `axum` handlers over the Job Store.
//!
//! Ingress concerns (API-key admission, CORS, rate limiting) are out of
//! scope; callers compose those externally before this router.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, ErrorKind};
use crate::models::job::{MAX_CLIENT_ID_LEN, MAX_PDF_URL_LEN};
use crate::models::{Job, JobResult};
use crate::repository::JobStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub ocr_retrieval_max_bytes: usize,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/jobs", post(submit_job))
        .route("/jobs/:id", get(get_status))
        .route("/jobs/:id/result", get(get_result))
        .route("/jobs/:id/ocr", get(get_ocr))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct SubmitJobRequest {
    pdf_url: String,
    client_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitJobResponse {
    id: String,
    status: &'static str,
}

async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    if request.pdf_url.len() > MAX_PDF_URL_LEN {
        return Err(ApiError(AppError::validation(
            crate::errors::Stage::Complete,
            format!("pdf_url exceeds {MAX_PDF_URL_LEN} bytes"),
        )));
    }
    if let Some(client_id) = &request.client_id {
        if client_id.len() > MAX_CLIENT_ID_LEN {
            return Err(ApiError(AppError::validation(
                crate::errors::Stage::Complete,
                format!("client_id exceeds {MAX_CLIENT_ID_LEN} bytes"),
            )));
        }
    }

    let job = state
        .store
        .create_job(&request.pdf_url, request.client_id.as_deref())
        .await
        .map_err(AppError::from)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            id: job.id,
            status: job.status.as_str(),
        }),
    ))
}

async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = state.store.get_job(&id).await.map_err(AppError::from)?;
    Ok(Json(job))
}

async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResult>, ApiError> {
    let result = state.store.get_result(&id).await.map_err(AppError::from)?;
    Ok(Json(result))
}

#[derive(Debug, Serialize)]
struct OcrResponse {
    job_id: String,
    ocr_provider: String,
    ocr_pages: Option<u32>,
    raw_ocr_text: String,
}

async fn get_ocr(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OcrResponse>, ApiError> {
    let result = state.store.get_result(&id).await.map_err(AppError::from)?;
    let raw_ocr_text = crate::ocr::cap_markdown(&result.raw_ocr_text, state.ocr_retrieval_max_bytes);
    Ok(Json(OcrResponse {
        job_id: result.job_id,
        ocr_provider: result.ocr_provider,
        ocr_pages: result.ocr_pages,
        raw_ocr_text,
    }))
}

/// Wraps [`AppError`] for the `IntoResponse` boundary: `NOT_FOUND` maps to
/// 404, `VALIDATION` to 400, everything else to 500 since it represents
/// an orchestrator-internal failure that shouldn't be retried by the
/// caller with a different request.
struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(e: AppError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.message }))).into_response()
    }
}
