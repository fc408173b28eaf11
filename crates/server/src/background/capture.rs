//! Snapshot capture loop.
//!
//! Fetches one frame per tick and files it into the frame store. There
//! is no backpressure: when a capture takes longer than the cadence the
//! next tick starts right after it completes -- missed ticks are never
//! queued up.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use lapse_core::capture::{self, CameraClient};
use lapse_core::frames::FrameStore;

/// Run the capture loop until cancelled.
pub async fn run(
    client: CameraClient,
    store: FrameStore,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs, "snapshot capture loop started");
    loop {
        if !client.is_configured() {
            tracing::warn!("camera credentials missing, skipping capture");
        } else {
            match capture::capture_once(&client, &store).await {
                Ok(path) => tracing::debug!(path = %path.display(), "capture tick complete"),
                Err(err) => tracing::warn!(error = %err, "capture tick failed"),
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("snapshot capture loop shutting down");
                break;
            }
            _ = tokio::time::sleep(Duration::from_secs(interval_secs)) => {}
        }
    }
}
