//! Camera snapshot client and the per-tick capture step.
//!
//! The camera's integration API lives behind a self-signed certificate,
//! so TLS verification is disabled by policy. Authentication is a single
//! `X-Api-Key` header. There are no retries inside a tick -- a failed
//! capture is logged and the next scheduled tick is the retry.

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::{CoreError, Result};
use crate::frames::FrameStore;

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for a single camera on the integration API.
#[derive(Debug, Clone)]
pub struct CameraClient {
    client: reqwest::Client,
    host: String,
    api_key: String,
    camera_id: String,
    request_high_quality: bool,
}

/// Formatted camera status for the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CameraStatus {
    pub name: String,
    pub model: String,
    pub state: String,
    pub up_since: Option<String>,
    pub connected: bool,
}

/// Raw subset of the camera detail payload we care about.
#[derive(Debug, Deserialize)]
struct CameraDetails {
    state: Option<String>,
    #[serde(rename = "modelKey")]
    model_key: Option<String>,
    name: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "upSince")]
    up_since: Option<i64>,
}

impl CameraClient {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            host: config.ufp_host.clone(),
            api_key: config.ufp_api_key.clone(),
            camera_id: config.camera_id.clone(),
            request_high_quality: config.hq_snapshot.requests_high_quality(),
        })
    }

    /// Whether host, API key, and camera id are all present.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty() && !self.api_key.is_empty() && !self.camera_id.is_empty()
    }

    fn camera_url(&self, suffix: &str) -> String {
        format!(
            "{}/proxy/protect/integration/v1/cameras/{}{suffix}",
            self.host, self.camera_id
        )
    }

    /// Fetch one JPEG snapshot from the camera.
    pub async fn fetch_snapshot(&self) -> Result<Vec<u8>> {
        if !self.is_configured() {
            return Err(CoreError::CameraUnconfigured);
        }

        let mut request = self
            .client
            .get(self.camera_url("/snapshot"))
            .header("X-Api-Key", &self.api_key)
            .timeout(SNAPSHOT_TIMEOUT);
        if self.request_high_quality {
            request = request.query(&[("highQuality", "true")]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::CameraApi {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetch and format the camera's detail record.
    pub async fn fetch_status(&self) -> Result<CameraStatus> {
        if !self.is_configured() {
            return Err(CoreError::CameraUnconfigured);
        }

        let response = self
            .client
            .get(self.camera_url(""))
            .header("X-Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::CameraApi {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let details: CameraDetails = response.json().await?;
        Ok(format_status(details))
    }
}

fn format_status(details: CameraDetails) -> CameraStatus {
    let state = details.state.unwrap_or_else(|| "Unknown".to_string());
    CameraStatus {
        name: details.name.unwrap_or_else(|| "N/A".to_string()),
        // "UVC G5 Bullet" reads better as "G5 Bullet" on the dashboard.
        model: details
            .model_key
            .map(|m| m.replace("UVC G", "G"))
            .unwrap_or_else(|| "N/A".to_string()),
        connected: state == "CONNECTED",
        state,
        up_since: details.up_since.and_then(format_up_since),
    }
}

fn format_up_since(millis: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
}

/// One capture tick: fetch a snapshot and record it at the current
/// instant. Returns the stored frame path.
pub async fn capture_once(client: &CameraClient, store: &FrameStore) -> Result<std::path::PathBuf> {
    let bytes = client.fetch_snapshot().await?;
    store_frame(store, Local::now().naive_local(), &bytes)
}

/// Filesystem half of a capture tick: write the frame, fill the hourly
/// gallery slot when it is the first frame of its hour, and refresh the
/// latest-snapshot pointer.
pub fn store_frame(
    store: &FrameStore,
    instant: NaiveDateTime,
    bytes: &[u8],
) -> Result<std::path::PathBuf> {
    let path = store.put(instant, bytes)?;
    tracing::info!(path = %path.display(), "snapshot saved");

    if store.record_gallery_slot(instant, &path)? {
        tracing::info!(slot = %store.gallery_slot_path(instant).display(), "saved new gallery image");
    }
    store.update_latest(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn store(dir: &TempDir) -> FrameStore {
        let root = dir.path().to_path_buf();
        FrameStore::with_dirs(root.clone(), root.join("snapshots"), root.join("gallery"))
    }

    #[test]
    fn store_frame_writes_frame_gallery_and_latest() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let first = store_frame(&store, dt("2025-01-02 07:00:10"), b"\xff\xd8\xff\xd9").unwrap();
        let second = store_frame(&store, dt("2025-01-02 07:30:00"), b"\xff\xd8\x00\xd9").unwrap();

        assert!(first.exists());
        assert!(second.exists());
        // Gallery keeps the earliest frame of the hour.
        let slot = store.gallery_slot_path(dt("2025-01-02 07:45:00"));
        assert_eq!(fs::read(slot).unwrap(), b"\xff\xd8\xff\xd9");
        // Latest tracks the most recent one.
        assert_eq!(fs::read(store.latest_path()).unwrap(), b"\xff\xd8\x00\xd9");
    }

    #[test]
    fn unconfigured_client_is_detected() {
        let config = AppConfig::with_data_dir("/tmp");
        let client = CameraClient::from_config(&config).unwrap();
        assert!(!client.is_configured());
    }

    #[tokio::test]
    async fn fetch_snapshot_without_credentials_fails_fast() {
        let config = AppConfig::with_data_dir("/tmp");
        let client = CameraClient::from_config(&config).unwrap();
        assert!(matches!(
            client.fetch_snapshot().await,
            Err(CoreError::CameraUnconfigured)
        ));
    }

    #[test]
    fn status_formatting() {
        let status = format_status(CameraDetails {
            state: Some("CONNECTED".into()),
            model_key: Some("UVC G5 Bullet".into()),
            name: Some("Backyard".into()),
            up_since: None,
        });
        assert_eq!(status.model, "G5 Bullet");
        assert_eq!(status.name, "Backyard");
        assert!(status.connected);

        let missing = format_status(CameraDetails {
            state: None,
            model_key: None,
            name: None,
            up_since: None,
        });
        assert_eq!(missing.state, "Unknown");
        assert_eq!(missing.model, "N/A");
        assert!(!missing.connected);
    }
}
