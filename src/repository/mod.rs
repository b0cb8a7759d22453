//! Repository layer for database persistence.

mod diesel_models;
mod diesel_pool;
mod job_store;

pub use diesel_pool::AsyncSqlitePool;
pub use job_store::{DieselJobStore, JobStore};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

impl From<RepositoryError> for crate::errors::AppError {
    fn from(e: RepositoryError) -> Self {
        use crate::errors::{AppError, ErrorKind, Stage};
        match e {
            RepositoryError::NotFound(msg) => AppError::not_found(Stage::Store, msg),
            RepositoryError::Conflict(msg) => AppError::conflict(Stage::Store, msg),
            other => AppError::new(ErrorKind::Transient, Stage::Store, other.to_string()),
        }
    }
}

/// Convert any displayable error into a diesel error, matching the
/// teacher's `to_diesel_error` so connection-establishment failures
/// (which diesel-async reports outside its own `Error` enum) still flow
/// through `RepositoryError::Database`.
pub fn to_diesel_error(e: impl std::fmt::Display) -> diesel::result::Error {
    diesel::result::Error::DatabaseError(
        diesel::result::DatabaseErrorKind::Unknown,
        Box::new(DbErrorInfo(e.to_string())),
    )
}

#[derive(Debug)]
struct DbErrorInfo(String);

impl diesel::result::DatabaseErrorInformation for DbErrorInfo {
    fn message(&self) -> &str {
        &self.0
    }
    fn details(&self) -> Option<&str> {
        None
    }
    fn hint(&self) -> Option<&str> {
        None
    }
    fn table_name(&self) -> Option<&str> {
        None
    }
    fn column_name(&self) -> Option<&str> {
        None
    }
    fn constraint_name(&self) -> Option<&str> {
        None
    }
    fn statement_position(&self) -> Option<i32> {
        None
    }
}
