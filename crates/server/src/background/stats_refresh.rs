//! Periodic refresh of the cached dashboard statistics so page loads
//! read a snapshot instead of walking the frame tree.

use std::time::Duration;

use chrono::Local;
use tokio_util::sync::CancellationToken;

use lapse_core::capture::CameraClient;
use lapse_core::frames::FrameStore;
use lapse_core::stats::CachedStats;
use lapse_core::status::RunStatus;

const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Run the stats refresh loop until cancelled.
pub async fn run(
    cache: CachedStats,
    store: FrameStore,
    run_status: RunStatus,
    camera: CameraClient,
    recent_days: i64,
    cancel: CancellationToken,
) {
    tracing::info!("cached stats refresher started");
    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("cached stats refresher shutting down");
                break;
            }
            _ = ticker.tick() => {
                cache
                    .refresh(&store, &run_status, &camera, recent_days, Local::now().date_naive())
                    .await;
            }
        }
    }
}
