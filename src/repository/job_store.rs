//! The Job Store: durable persistence of jobs and results, with
//! compare-and-set transitions so concurrent workers never double-advance
//! the same job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::diesel_models::{JobRecord, JobResultRecord, NewJobRecord, NewJobResultRecord};
use super::diesel_pool::AsyncSqlitePool;
use super::{RepositoryError, Result};
use crate::models::job::{new_job_id, Job, JobStatus, ProcessingPhase};
use crate::models::result::JobResult;
use crate::schema::{job_results, jobs};

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

impl TryFrom<JobRecord> for Job {
    type Error = RepositoryError;

    fn try_from(r: JobRecord) -> std::result::Result<Self, Self::Error> {
        let status = JobStatus::from_str(&r.status)
            .ok_or_else(|| RepositoryError::NotFound(format!("unknown status {}", r.status)))?;
        let processing_phase = r
            .processing_phase
            .as_deref()
            .and_then(ProcessingPhase::from_str);
        Ok(Job {
            id: r.id,
            client_id: r.client_id,
            status,
            processing_phase,
            pdf_url: r.pdf_url,
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
            completed_at: parse_datetime_opt(r.completed_at),
            error_message: r.error_message,
        })
    }
}

impl TryFrom<JobResultRecord> for JobResult {
    type Error = RepositoryError;

    fn try_from(r: JobResultRecord) -> std::result::Result<Self, Self::Error> {
        Ok(JobResult {
            job_id: r.job_id,
            extracted_data: serde_json::from_str(&r.extracted_data)?,
            confidence_score: r.confidence_score,
            tokens_used: r.tokens_used as u64,
            raw_ocr_text: r.raw_ocr_text,
            ocr_provider: r.ocr_provider,
            ocr_duration_ms: r.ocr_duration_ms as u64,
            ocr_pages: r.ocr_pages.map(|p| p as u32),
            created_at: parse_datetime(&r.created_at),
        })
    }
}

/// The durable interface the orchestrator and the read API drive the
/// pipeline through. Every mutating method is a single `UPDATE ... WHERE`
/// compare-and-set: it returns `Ok(())` only if exactly one row matched the
/// expected prior state, and [`RepositoryError::Conflict`] otherwise — a
/// losing worker observes `CONFLICT` and drops its work rather than
/// retrying, matching the "at-most-once advance" invariant.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(&self, pdf_url: &str, client_id: Option<&str>) -> Result<Job>;
    async fn get_job(&self, id: &str) -> Result<Job>;
    async fn get_result(&self, job_id: &str) -> Result<JobResult>;
    /// Pop the oldest `queued` job and atomically move it to `processing`.
    /// Returns `Ok(None)` when the queue is empty.
    async fn claim_next_queued(&self) -> Result<Option<Job>>;
    async fn set_phase(&self, job_id: &str, phase: ProcessingPhase) -> Result<()>;
    async fn complete_job(&self, job_id: &str, result: &JobResult) -> Result<()>;
    async fn fail_job(&self, job_id: &str, error_message: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct DieselJobStore {
    pool: AsyncSqlitePool,
}

impl DieselJobStore {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for DieselJobStore {
    async fn create_job(&self, pdf_url: &str, client_id: Option<&str>) -> Result<Job> {
        let mut conn = self.pool.get().await?;
        let id = new_job_id();
        let now = Utc::now().to_rfc3339();

        diesel::insert_into(jobs::table)
            .values(NewJobRecord {
                id: &id,
                client_id,
                status: JobStatus::Queued.as_str(),
                processing_phase: None,
                pdf_url,
                created_at: &now,
                updated_at: &now,
            })
            .execute(&mut conn)
            .await?;

        let record: JobRecord = jobs::table.find(&id).first(&mut conn).await?;
        Ok(Job::try_from(record)?)
    }

    async fn get_job(&self, id: &str) -> Result<Job> {
        let mut conn = self.pool.get().await?;
        let record: JobRecord = jobs::table
            .find(id)
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("job {id} not found")))?;
        Job::try_from(record)
    }

    async fn get_result(&self, job_id: &str) -> Result<JobResult> {
        let mut conn = self.pool.get().await?;
        let record: JobResultRecord = job_results::table
            .filter(job_results::job_id.eq(job_id))
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("result for job {job_id} not found")))?;
        JobResult::try_from(record)
    }

    async fn claim_next_queued(&self) -> Result<Option<Job>> {
        let mut conn = self.pool.get().await?;

        let candidate: Option<JobRecord> = jobs::table
            .filter(jobs::status.eq(JobStatus::Queued.as_str()))
            .order(jobs::created_at.asc())
            .first(&mut conn)
            .await
            .optional()?;

        let Some(candidate) = candidate else {
            return Ok(None);
        };

        let now = Utc::now().to_rfc3339();
        let updated = diesel::update(
            jobs::table
                .filter(jobs::id.eq(&candidate.id))
                .filter(jobs::status.eq(JobStatus::Queued.as_str())),
        )
        .set((
            jobs::status.eq(JobStatus::Processing.as_str()),
            jobs::processing_phase.eq(ProcessingPhase::AnalyzingInvoice.as_str()),
            jobs::updated_at.eq(&now),
        ))
        .execute(&mut conn)
        .await?;

        if updated == 0 {
            // Another worker claimed it between the select and the update.
            return Ok(None);
        }

        let record: JobRecord = jobs::table.find(&candidate.id).first(&mut conn).await?;
        Ok(Some(Job::try_from(record)?))
    }

    async fn set_phase(&self, job_id: &str, phase: ProcessingPhase) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        // Phase transitions must be monotone: fetch the current row and
        // reject non-`processing` status or a phase that does not strictly
        // advance before issuing the CAS update, so a backward or repeat
        // call (a race or a regression) reports `CONFLICT` rather than
        // silently rewinding or re-stamping the phase.
        let current: JobRecord = jobs::table
            .find(job_id)
            .first(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| RepositoryError::NotFound(format!("job {job_id} not found")))?;

        if current.status != JobStatus::Processing.as_str() {
            return Err(RepositoryError::Conflict(format!(
                "job {job_id} is not in processing state"
            )));
        }
        let current_phase = current
            .processing_phase
            .as_deref()
            .and_then(ProcessingPhase::from_str);
        if let Some(current_phase) = current_phase {
            if phase <= current_phase {
                return Err(RepositoryError::Conflict(format!(
                    "job {job_id} phase {phase:?} does not advance past {current_phase:?}"
                )));
            }
        }

        let updated = diesel::update(
            jobs::table
                .filter(jobs::id.eq(job_id))
                .filter(jobs::status.eq(JobStatus::Processing.as_str()))
                .filter(jobs::processing_phase.eq(current.processing_phase.as_deref())),
        )
        .set((
            jobs::processing_phase.eq(phase.as_str()),
            jobs::updated_at.eq(&now),
        ))
        .execute(&mut conn)
        .await?;

        if updated == 0 {
            return Err(RepositoryError::Conflict(format!(
                "job {job_id} is not in processing state"
            )));
        }
        Ok(())
    }

    async fn complete_job(&self, job_id: &str, result: &JobResult) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();
        let extracted_data = serde_json::to_string(&result.extracted_data)?;

        let updated = diesel::update(
            jobs::table
                .filter(jobs::id.eq(job_id))
                .filter(jobs::status.eq(JobStatus::Processing.as_str())),
        )
        .set((
            jobs::status.eq(JobStatus::Completed.as_str()),
            jobs::processing_phase.eq(None::<&str>),
            jobs::completed_at.eq(&now),
            jobs::updated_at.eq(&now),
        ))
        .execute(&mut conn)
        .await?;

        if updated == 0 {
            return Err(RepositoryError::Conflict(format!(
                "job {job_id} is not in processing state"
            )));
        }

        diesel::insert_into(job_results::table)
            .values(NewJobResultRecord {
                job_id,
                extracted_data: &extracted_data,
                confidence_score: result.confidence_score,
                tokens_used: result.tokens_used as i64,
                raw_ocr_text: &result.raw_ocr_text,
                ocr_provider: &result.ocr_provider,
                ocr_duration_ms: result.ocr_duration_ms as i64,
                ocr_pages: result.ocr_pages.map(|p| p as i32),
                created_at: &now,
            })
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error_message: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();
        let message = crate::errors::truncate_bytes(&crate::errors::redact(error_message), 4096);

        let updated = diesel::update(
            jobs::table
                .filter(jobs::id.eq(job_id))
                .filter(jobs::status.eq(JobStatus::Processing.as_str())),
        )
        .set((
            jobs::status.eq(JobStatus::Failed.as_str()),
            jobs::processing_phase.eq(None::<&str>),
            jobs::completed_at.eq(&now),
            jobs::updated_at.eq(&now),
            jobs::error_message.eq(&message),
        ))
        .execute(&mut conn)
        .await?;

        if updated == 0 {
            return Err(RepositoryError::Conflict(format!(
                "job {job_id} is not in processing state"
            )));
        }
        Ok(())
    }
}
