//! Diesel async connection factory for SQLite.
//!
//! Uses diesel-async's `SyncConnectionWrapper`, which drives the
//! ordinary synchronous `SqliteConnection` through `spawn_blocking`.
//! SQLite connections are cheap and file-based, so — matching the
//! teacher's `AsyncSqlitePool` — a fresh connection is opened per
//! operation rather than pooled; WAL mode and a busy timeout make that
//! affordable under concurrent workers.

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

use super::to_diesel_error;

pub type DieselError = diesel::result::Error;
pub type AsyncSqliteConnection = SyncConnectionWrapper<SqliteConnection>;

#[derive(Clone)]
pub struct AsyncSqlitePool {
    database_url: String,
}

impl AsyncSqlitePool {
    pub fn new(database_url: &str) -> Self {
        let url = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        Self {
            database_url: url.to_string(),
        }
    }

    pub async fn get(&self) -> Result<AsyncSqliteConnection, DieselError> {
        let mut conn = AsyncSqliteConnection::establish(&self.database_url)
            .await
            .map_err(to_diesel_error)?;
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; \
             PRAGMA synchronous = NORMAL; \
             PRAGMA foreign_keys = ON; \
             PRAGMA busy_timeout = 30000;",
        )
        .await?;
        Ok(conn)
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}
