//! Hourly expiry sweep over share links, independent of the job-queue
//! `sweep-shares` pass so expired links disappear even when the worker
//! is busy with a long encode.

use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;

use lapse_db::shares::ShareRepo;
use lapse_db::SqlitePool;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Run the share-link expiry loop until cancelled.
pub async fn run(pool: SqlitePool, cancel: CancellationToken) {
    tracing::info!("share link cleanup loop started");
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("share link cleanup loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Err(err) = ShareRepo::delete_expired(&pool, Local::now().naive_local()).await {
                    tracing::error!(error = %err, "share link cleanup failed");
                }
            }
        }
    }
}
