//! Repository for the `jobs` table.
//!
//! The queue is a plain FIFO with a single consumer: the scheduler
//! inserts, the worker drains in insertion order and deletes rows when
//! it is done with them, successful or not. No cross-worker locking is
//! needed as long as exactly one worker runs.

use sqlx::SqlitePool;

use crate::models::{Job, JobStatus, JobType};

/// Column list for `jobs` queries.
const COLUMNS: &str = "id, job_type, payload, status, error, created_at, updated_at";

/// Provides CRUD operations for queued jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new pending job and return its id.
    pub async fn create(
        pool: &SqlitePool,
        job_type: JobType,
        payload: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO jobs (job_type, payload) VALUES (?, ?)")
            .bind(job_type.as_str())
            .bind(payload)
            .execute(pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// The oldest pending job, if any. `created_at` has one-second
    /// resolution, so the id breaks ties to keep dispatch strictly FIFO.
    pub async fn next_pending(pool: &SqlitePool) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE status = ? \
             ORDER BY created_at ASC, id ASC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Pending.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Update a job's status. `error` is stored only for failures.
    pub async fn update_status(
        pool: &SqlitePool,
        id: i64,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET status = ?, error = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(error)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Remove a job row.
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// All jobs in dispatch order, for the dashboard's queue view.
    pub async fn list(pool: &SqlitePool) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs ORDER BY created_at ASC, id ASC");
        sqlx::query_as::<_, Job>(&query).fetch_all(pool).await
    }
}
