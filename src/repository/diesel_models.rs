//! Diesel row models, mirroring the `jobs`/`job_results` tables in [`crate::schema`].

use diesel::prelude::*;

use crate::schema::{job_results, jobs};

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobRecord {
    pub id: String,
    pub client_id: Option<String>,
    pub status: String,
    pub processing_phase: Option<String>,
    pub pdf_url: String,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = jobs)]
pub struct NewJobRecord<'a> {
    pub id: &'a str,
    pub client_id: Option<&'a str>,
    pub status: &'a str,
    pub processing_phase: Option<&'a str>,
    pub pdf_url: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = job_results)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobResultRecord {
    pub id: i32,
    pub job_id: String,
    pub extracted_data: String,
    pub confidence_score: Option<f64>,
    pub tokens_used: i64,
    pub raw_ocr_text: String,
    pub ocr_provider: String,
    pub ocr_duration_ms: i64,
    pub ocr_pages: Option<i32>,
    pub created_at: String,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = job_results)]
pub struct NewJobResultRecord<'a> {
    pub job_id: &'a str,
    pub extracted_data: &'a str,
    pub confidence_score: Option<f64>,
    pub tokens_used: i64,
    pub raw_ocr_text: &'a str,
    pub ocr_provider: &'a str,
    pub ocr_duration_ms: i64,
    pub ocr_pages: Option<i32>,
    pub created_at: &'a str,
}
