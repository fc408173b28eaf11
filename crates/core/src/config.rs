//! Application configuration loaded from environment variables.
//!
//! All knobs have defaults suitable for a single-camera deployment; the
//! only hard requirement is `APP_KEY`, which must be a valid base64 string.
//! Misconfiguration is fatal at startup by design.

use std::fs;
use std::io;
use std::path::PathBuf;

use base64::Engine;
use chrono::NaiveDate;

/// How the camera's high-quality snapshot mode is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HqSnapshotMode {
    /// Let the camera decide (still requests high quality when supported).
    Auto,
    /// Always append `highQuality=true`.
    On,
    /// Never request the high-quality variant.
    Off,
}

impl HqSnapshotMode {
    /// Parse the `HQSNAP` value. Unknown strings fall back to `Auto`.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "true" => Self::On,
            "false" => Self::Off,
            _ => Self::Auto,
        }
    }

    /// Whether the snapshot request should carry the high-quality flag.
    pub fn requests_high_quality(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// Runtime configuration for the whole daemon.
///
/// | Env var | Default |
/// |---|---|
/// | `UFP_HOST` | (empty) |
/// | `UFP_API_KEY` | (empty) |
/// | `TARGET_CAMERA_ID` | (empty) |
/// | `DATA_DIR` | `data` |
/// | `SNAPSHOTS_DIR` | `snapshots` |
/// | `GALLERY_DIR` | `gallery` |
/// | `TIMELAPSE_INTERVAL` | `3600` |
/// | `VIDEO_CRON_INTERVAL` | `300` |
/// | `VIDEO_ARCHIVES_TO_KEEP` | `3` |
/// | `DAYS_OF_24_HOUR_SNAPSHOTS` | `30` |
/// | `SNAPSHOT_RETENTION_DAYS` | `30` |
/// | `GALLERY_RETENTION_DAYS` | `365` |
/// | `VIDEO_QUALITY` | `medium` |
/// | `HQSNAP` | `auto` |
/// | `APP_KEY` | (required, base64) |
/// | `ADMIN_PASSWORD` | (empty; required on first run) |
/// | `SHARE_LINK_EXPIRY_HOURS` | `24` |
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ufp_host: String,
    pub ufp_api_key: String,
    pub camera_id: String,
    pub data_dir: PathBuf,
    pub snapshots_dir: PathBuf,
    pub gallery_dir: PathBuf,
    pub snapshot_interval_secs: u64,
    pub video_interval_secs: u64,
    pub video_archives_to_keep: usize,
    pub days_of_24_hour_snapshots: i64,
    pub snapshot_retention_days: i64,
    pub gallery_retention_days: i64,
    pub video_quality: String,
    pub hq_snapshot: HqSnapshotMode,
    pub app_key: String,
    pub admin_password: String,
    pub share_link_expiry_hours: i64,
}

impl AppConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// Panics when `APP_KEY` is missing or not valid base64 -- we want
    /// misconfiguration to fail fast, before any task starts.
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(env_or("DATA_DIR", "data"));
        let snapshots_dir = data_dir.join(env_or("SNAPSHOTS_DIR", "snapshots"));
        let gallery_dir = data_dir.join(env_or("GALLERY_DIR", "gallery"));

        let mut ufp_host = env_or("UFP_HOST", "");
        if !ufp_host.is_empty() && !ufp_host.contains("://") {
            ufp_host = format!("https://{ufp_host}");
        }

        let app_key = std::env::var("APP_KEY")
            .expect("APP_KEY environment variable must be set");
        base64::engine::general_purpose::STANDARD
            .decode(&app_key)
            .expect("APP_KEY is not a valid base64 encoded string");

        Self {
            ufp_host,
            ufp_api_key: env_or("UFP_API_KEY", ""),
            camera_id: env_or("TARGET_CAMERA_ID", ""),
            data_dir,
            snapshots_dir,
            gallery_dir,
            snapshot_interval_secs: env_parse_or("TIMELAPSE_INTERVAL", 3600),
            video_interval_secs: env_parse_or("VIDEO_CRON_INTERVAL", 300),
            video_archives_to_keep: env_parse_or("VIDEO_ARCHIVES_TO_KEEP", 3),
            days_of_24_hour_snapshots: env_parse_or("DAYS_OF_24_HOUR_SNAPSHOTS", 30),
            snapshot_retention_days: env_parse_or("SNAPSHOT_RETENTION_DAYS", 30),
            gallery_retention_days: env_parse_or("GALLERY_RETENTION_DAYS", 365),
            video_quality: env_or("VIDEO_QUALITY", "medium"),
            hq_snapshot: HqSnapshotMode::parse(&env_or("HQSNAP", "auto")),
            app_key,
            admin_password: env_or("ADMIN_PASSWORD", ""),
            share_link_expiry_hours: env_parse_or("SHARE_LINK_EXPIRY_HOURS", 24),
        }
    }

    /// A configuration with every knob at its default and no camera
    /// credentials, rooted at the given data dir. Useful for tests and
    /// for embedders that configure programmatically.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            ufp_host: String::new(),
            ufp_api_key: String::new(),
            camera_id: String::new(),
            snapshots_dir: data_dir.join("snapshots"),
            gallery_dir: data_dir.join("gallery"),
            data_dir,
            snapshot_interval_secs: 3600,
            video_interval_secs: 300,
            video_archives_to_keep: 3,
            days_of_24_hour_snapshots: 30,
            snapshot_retention_days: 30,
            gallery_retention_days: 365,
            video_quality: "medium".into(),
            hq_snapshot: HqSnapshotMode::Auto,
            app_key: String::new(),
            admin_password: String::new(),
            share_link_expiry_hours: 24,
        }
    }

    /// Create the data directories and pin all paths to their canonical
    /// (absolute) form so frame paths recorded in sidecars stay stable
    /// regardless of the working directory the daemon was launched from.
    pub fn ensure_data_dirs(&mut self) -> io::Result<()> {
        fs::create_dir_all(&self.snapshots_dir)?;
        fs::create_dir_all(&self.gallery_dir)?;
        self.data_dir = self.data_dir.canonicalize()?;
        self.snapshots_dir = self.snapshots_dir.canonicalize()?;
        self.gallery_dir = self.gallery_dir.canonicalize()?;
        Ok(())
    }

    /// Path of the SQLite database file.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("lapse.db")
    }

    /// Path of the ffmpeg log file for the given day.
    pub fn ffmpeg_log_path(&self, date: NaiveDate) -> PathBuf {
        self.data_dir
            .join(format!("ffmpeg_log_{}.txt", date.format("%Y-%m-%d")))
    }

    /// CRF value for the configured video quality.
    pub fn crf_value(&self) -> &'static str {
        crf_for_quality(&self.video_quality)
    }
}

/// Map a quality label to the CRF the encoder is invoked with.
/// Unknown labels get the medium default.
pub fn crf_for_quality(quality: &str) -> &'static str {
    match quality.to_ascii_lowercase().as_str() {
        "low" => "35",
        "medium" => "28",
        "high" => "20",
        "ultra" => "15",
        _ => "28",
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
