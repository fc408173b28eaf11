//! Single-threaded job worker.
//!
//! Dequeues the oldest pending job, dispatches it to the assembler or
//! the matching retention sweep, records the outcome, and deletes the
//! row. Failed jobs are terminal -- the scheduler's next tick re-enqueues
//! the work, so the queue never accumulates retries.

use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;

use lapse_core::assembler::VideoAssembler;
use lapse_core::config::AppConfig;
use lapse_core::frames::FrameStore;
use lapse_core::retention;
use lapse_core::status::RunStatus;
use lapse_core::CoreError;
use lapse_db::jobs::JobRepo;
use lapse_db::models::{AssemblePayload, Job, JobStatus, JobType};
use lapse_db::SqlitePool;

/// How long the worker sleeps when the queue is empty.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct Worker {
    pool: SqlitePool,
    config: AppConfig,
    store: FrameStore,
    assembler: VideoAssembler,
    status: RunStatus,
}

impl Worker {
    pub fn new(pool: SqlitePool, config: AppConfig, store: FrameStore, status: RunStatus) -> Self {
        let assembler = VideoAssembler::new(config.clone(), store.clone(), status.clone());
        Self {
            pool,
            config,
            store,
            assembler,
            status,
        }
    }

    /// Run the worker loop until the cancellation token is triggered.
    /// A job in flight is never interrupted mid-way; cancellation takes
    /// effect between jobs.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("job worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let job = match JobRepo::next_pending(&self.pool).await {
                Ok(Some(job)) => job,
                Ok(None) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => continue,
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to poll for pending jobs");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => continue,
                    }
                }
            };

            self.process(job).await;
        }
        tracing::info!("job worker shutting down");
    }

    /// Run one job through its full lifecycle: running, dispatch,
    /// completed/failed, delete.
    pub async fn process(&self, job: Job) {
        tracing::info!(job_id = job.id, job_type = %job.job_type, "processing job");

        if let Err(err) = JobRepo::update_status(&self.pool, job.id, JobStatus::Running, None).await
        {
            tracing::error!(job_id = job.id, error = %err, "failed to mark job running");
            return;
        }

        let result = self.dispatch(&job).await;
        let finished_at = Local::now().naive_local();

        match &result {
            Ok(()) => {
                tracing::info!(job_id = job.id, "job completed");
                self.status.finish(finished_at, None);
                if let Err(err) =
                    JobRepo::update_status(&self.pool, job.id, JobStatus::Completed, None).await
                {
                    tracing::error!(job_id = job.id, error = %err, "failed to mark job completed");
                }
            }
            Err(err) => {
                tracing::warn!(job_id = job.id, error = %err, "job failed");
                self.status.finish(finished_at, Some(err.to_string()));
                if let Err(db_err) = JobRepo::update_status(
                    &self.pool,
                    job.id,
                    JobStatus::Failed,
                    Some(&err.to_string()),
                )
                .await
                {
                    tracing::error!(job_id = job.id, error = %db_err, "failed to mark job failed");
                }
            }
        }

        // Processed jobs are removed either way; the scheduler's next
        // tick re-enqueues the work.
        if let Err(err) = JobRepo::delete(&self.pool, job.id).await {
            tracing::error!(job_id = job.id, error = %err, "failed to delete job");
        }
    }

    async fn dispatch(&self, job: &Job) -> Result<(), CoreError> {
        let now = Local::now().naive_local();
        match JobType::parse(&job.job_type) {
            None => Err(CoreError::UnknownJobType(job.job_type.clone())),
            Some(JobType::Assemble) => {
                let payload: AssemblePayload =
                    serde_json::from_str(job.payload.as_deref().unwrap_or("{}"))?;
                self.status.begin(&payload.timelapse_name);
                self.assembler.assemble(&payload.timelapse_name).await
            }
            Some(JobType::SweepFrames) => {
                self.status.begin(job.job_type.as_str());
                retention::sweep_frames(&self.store, self.config.snapshot_retention_days, now);
                Ok(())
            }
            Some(JobType::SweepGallery) => {
                self.status.begin(job.job_type.as_str());
                retention::sweep_gallery(&self.store, self.config.gallery_retention_days, now);
                Ok(())
            }
            Some(JobType::SweepVideos) => {
                self.status.begin(job.job_type.as_str());
                retention::sweep_daily_videos(
                    self.store.data_dir(),
                    self.config.days_of_24_hour_snapshots,
                    now,
                );
                retention::sweep_archives(self.store.data_dir(), self.config.video_archives_to_keep);
                Ok(())
            }
            Some(JobType::SweepLogs) => {
                self.status.begin(job.job_type.as_str());
                retention::sweep_logs(self.store.data_dir(), now);
                Ok(())
            }
            Some(JobType::SweepShares) => {
                self.status.begin(job.job_type.as_str());
                lapse_db::shares::ShareRepo::delete_expired(&self.pool, now)
                    .await
                    .map_err(|err| CoreError::Internal(err.to_string()))?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn worker(pool: SqlitePool, dir: &TempDir) -> Worker {
        let mut config = AppConfig::with_data_dir(dir.path().to_path_buf());
        config.snapshot_retention_days = 10;
        std::fs::create_dir_all(&config.snapshots_dir).unwrap();
        std::fs::create_dir_all(&config.gallery_dir).unwrap();
        let store = FrameStore::new(&config);
        Worker::new(pool, config, store, RunStatus::new())
    }

    fn job(job_type: &str, payload: Option<&str>) -> Job {
        let at = Local::now().naive_local();
        Job {
            id: 1,
            job_type: job_type.to_string(),
            payload: payload.map(str::to_string),
            status: "pending".into(),
            error: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn unknown_job_type_fails_dispatch(pool: SqlitePool) {
        let dir = TempDir::new().unwrap();
        let worker = worker(pool, &dir);

        let result = worker.dispatch(&job("generate_timelapse", None)).await;
        assert!(matches!(result, Err(CoreError::UnknownJobType(_))));
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn sweep_frames_job_enforces_retention(pool: SqlitePool) {
        let dir = TempDir::new().unwrap();
        let worker = worker(pool, &dir);

        let now = Local::now().naive_local();
        let old = worker.store.put(now - ChronoDuration::days(11), b"old").unwrap();
        let recent = worker.store.put(now - ChronoDuration::days(5), b"new").unwrap();

        worker.dispatch(&job("sweep-frames", None)).await.unwrap();

        assert!(!old.exists());
        assert!(recent.exists());
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn assemble_with_bad_payload_is_a_payload_error(pool: SqlitePool) {
        let dir = TempDir::new().unwrap();
        let worker = worker(pool, &dir);

        let result = worker.dispatch(&job("assemble", Some("not json"))).await;
        assert!(matches!(result, Err(CoreError::Payload(_))));
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn process_deletes_the_job_and_records_the_run(pool: SqlitePool) {
        let dir = TempDir::new().unwrap();
        let worker = worker(pool.clone(), &dir);

        let id = JobRepo::create(&pool, JobType::SweepLogs, None).await.unwrap();
        let queued = JobRepo::next_pending(&pool).await.unwrap().unwrap();
        assert_eq!(queued.id, id);

        worker.process(queued).await;

        assert!(JobRepo::next_pending(&pool).await.unwrap().is_none());
        assert!(JobRepo::list(&pool).await.unwrap().is_empty());
        let status = worker.status.snapshot();
        assert!(!status.is_running);
        assert!(status.last_run.is_some());
        assert!(status.error.is_none());
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn failed_job_is_still_deleted_and_error_surfaced(pool: SqlitePool) {
        let dir = TempDir::new().unwrap();
        let worker = worker(pool.clone(), &dir);

        JobRepo::create(&pool, JobType::Assemble, Some("not json")).await.unwrap();
        let queued = JobRepo::next_pending(&pool).await.unwrap().unwrap();

        worker.process(queued).await;

        // Terminal: the row is gone, the failure is visible in run status.
        assert!(JobRepo::list(&pool).await.unwrap().is_empty());
        let status = worker.status.snapshot();
        assert!(status.error.is_some());
    }
}
