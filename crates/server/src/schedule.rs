//! Timelapse job scheduler.
//!
//! On a fixed cadence the scheduler enqueues the full generation set:
//! one assemble job per recent calendar day, one per static rollup
//! spec, and one of each retention sweep. The worker drains them in
//! insertion order. `enqueue_all_jobs` is also the single command the
//! external HTTP layer calls for an on-demand generation pass.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use tokio_util::sync::CancellationToken;

use lapse_core::config::AppConfig;
use lapse_core::{ffmpeg, timelapse};
use lapse_db::jobs::JobRepo;
use lapse_db::models::{AssemblePayload, JobType};
use lapse_db::SqlitePool;

/// Run the scheduler loop until cancelled. Encoder discovery happens
/// once here, before the first enqueue, so the first job never pays
/// the probe.
pub async fn run(pool: SqlitePool, config: AppConfig, cancel: CancellationToken) {
    let caps = ffmpeg::encoder_caps().await;
    tracing::info!(
        codec = caps.codec,
        interval_secs = config.video_interval_secs,
        "timelapse scheduler started"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.video_interval_secs));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("timelapse scheduler shutting down");
                break;
            }
            _ = ticker.tick() => {
                match enqueue_all_jobs(&pool, &config, Local::now().date_naive()).await {
                    Ok(enqueued) => tracing::debug!(enqueued, "enqueued timelapse jobs"),
                    Err(err) => tracing::error!(error = %err, "failed to enqueue timelapse jobs"),
                }
            }
        }
    }
}

/// Enqueue one full generation pass: per-day assembles for the recent
/// days, the static rollups, and every sweep type. Returns the number
/// of jobs created.
pub async fn enqueue_all_jobs(
    pool: &SqlitePool,
    config: &AppConfig,
    today: NaiveDate,
) -> Result<usize, sqlx::Error> {
    let mut enqueued = 0;

    for offset in 0..config.days_of_24_hour_snapshots {
        let name = timelapse::daily_spec_name(today - ChronoDuration::days(offset));
        enqueue_assemble(pool, &name).await?;
        enqueued += 1;
    }

    for spec in timelapse::SPECS {
        enqueue_assemble(pool, spec.name).await?;
        enqueued += 1;
    }

    for sweep in JobType::SWEEPS {
        JobRepo::create(pool, sweep, None).await?;
        enqueued += 1;
    }

    Ok(enqueued)
}

async fn enqueue_assemble(pool: &SqlitePool, timelapse_name: &str) -> Result<i64, sqlx::Error> {
    let payload = serde_json::json!(AssemblePayload {
        timelapse_name: timelapse_name.to_string(),
    })
    .to_string();
    JobRepo::create(pool, JobType::Assemble, Some(&payload)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "../db/migrations")]
    async fn enqueues_daily_static_and_sweep_jobs(pool: SqlitePool) {
        let mut config = AppConfig::with_data_dir("/tmp/lapse-test");
        config.days_of_24_hour_snapshots = 3;
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();

        let enqueued = enqueue_all_jobs(&pool, &config, today).await.unwrap();
        // 3 daily + 3 static rollups + 5 sweeps.
        assert_eq!(enqueued, 11);

        let jobs = JobRepo::list(&pool).await.unwrap();
        assert_eq!(jobs.len(), 11);

        // Daily assembles come first, newest day first.
        assert_eq!(jobs[0].job_type, "assemble");
        assert!(jobs[0]
            .payload
            .as_deref()
            .unwrap()
            .contains("24_hour_2025-01-10"));
        assert!(jobs[2]
            .payload
            .as_deref()
            .unwrap()
            .contains("24_hour_2025-01-08"));

        // Then the static rollups.
        assert!(jobs[3].payload.as_deref().unwrap().contains("1_week"));
        assert!(jobs[4].payload.as_deref().unwrap().contains("1_month"));
        assert!(jobs[5].payload.as_deref().unwrap().contains("1_year"));

        // And finally one of each sweep type.
        let sweep_types: Vec<&str> = jobs[6..].iter().map(|j| j.job_type.as_str()).collect();
        assert_eq!(
            sweep_types,
            vec![
                "sweep-frames",
                "sweep-videos",
                "sweep-logs",
                "sweep-gallery",
                "sweep-shares"
            ]
        );
    }

    #[sqlx::test(migrations = "../db/migrations")]
    async fn assemble_payload_is_decodable(pool: SqlitePool) {
        enqueue_assemble(&pool, "1_week").await.unwrap();
        let job = JobRepo::next_pending(&pool).await.unwrap().unwrap();
        let payload: AssemblePayload =
            serde_json::from_str(job.payload.as_deref().unwrap()).unwrap();
        assert_eq!(payload.timelapse_name, "1_week");
    }
}
