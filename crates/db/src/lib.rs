//! SQLite persistence for the lapse pipeline.
//!
//! Everything lives in one database file (`lapse.db` under the data
//! dir): the job queue coordinating the scheduler and the worker, the
//! share-link table backing public downloads, and the user table for the
//! external auth layer.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub mod jobs;
pub mod models;
pub mod shares;
pub mod users;

pub use sqlx::SqlitePool;

/// Create a connection pool over the given database file, creating it
/// when missing. WAL keeps the single writer from blocking readers.
pub async fn create_pool(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Apply all pending migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Cheap connectivity probe used at startup.
pub async fn health_check(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
