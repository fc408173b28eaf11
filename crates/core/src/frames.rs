//! Time-keyed frame store on a hierarchical filesystem layout.
//!
//! Frames live under `snapshots/YYYY-MM/DD/HH/YYYY-MM-DD-HH-MM-SS.jpg`,
//! which makes lexicographic path order equal to chronological capture
//! order. The gallery keeps one representative frame per (date, hour),
//! first writer wins, and `latest_snapshot.jpg` always mirrors the most
//! recent capture.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use walkdir::WalkDir;

use crate::config::AppConfig;
use crate::error::Result;

/// Timestamp format used in frame file names (second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Durable store of captured frames plus the gallery and latest pointer.
#[derive(Debug, Clone)]
pub struct FrameStore {
    data_dir: PathBuf,
    snapshots_dir: PathBuf,
    gallery_dir: PathBuf,
}

impl FrameStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            snapshots_dir: config.snapshots_dir.clone(),
            gallery_dir: config.gallery_dir.clone(),
        }
    }

    /// Build a store over explicit directories (used by tests).
    pub fn with_dirs(data_dir: PathBuf, snapshots_dir: PathBuf, gallery_dir: PathBuf) -> Self {
        Self {
            data_dir,
            snapshots_dir,
            gallery_dir,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }

    pub fn gallery_dir(&self) -> &Path {
        &self.gallery_dir
    }

    /// Write a captured frame under its time-keyed path, creating parent
    /// directories as needed. A second capture within the same second
    /// overwrites the first -- both represent essentially the same instant.
    pub fn put(&self, instant: NaiveDateTime, bytes: &[u8]) -> Result<PathBuf> {
        let dir = self
            .snapshots_dir
            .join(instant.format("%Y-%m").to_string())
            .join(instant.format("%d").to_string())
            .join(instant.format("%H").to_string());
        fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.jpg", instant.format(TIMESTAMP_FORMAT)));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// All frame paths, lexicographically sorted (= chronological order).
    pub fn list(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.snapshots_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("jpg"))
            .collect();
        files.sort();
        files
    }

    /// Path of the video-poster pointer file.
    pub fn latest_path(&self) -> PathBuf {
        self.data_dir.join("latest_snapshot.jpg")
    }

    /// Overwrite `latest_snapshot.jpg` with the given frame.
    pub fn update_latest(&self, frame: &Path) -> Result<()> {
        fs::copy(frame, self.latest_path())?;
        Ok(())
    }

    /// Gallery slot path for the (date, hour) the instant falls in.
    pub fn gallery_slot_path(&self, instant: NaiveDateTime) -> PathBuf {
        self.gallery_dir
            .join(format!("{}.jpg", instant.format("%Y-%m-%d-%H")))
    }

    /// Copy the frame into its gallery slot unless the slot is already
    /// occupied (first frame of the hour wins). Returns whether a new
    /// slot was written.
    pub fn record_gallery_slot(&self, instant: NaiveDateTime, frame: &Path) -> Result<bool> {
        let slot = self.gallery_slot_path(instant);
        if slot.exists() {
            return Ok(false);
        }
        fs::create_dir_all(&self.gallery_dir)?;
        fs::copy(frame, &slot)?;
        Ok(true)
    }
}

/// Strictly parse a frame file name (`YYYY-MM-DD-HH-MM-SS.jpg`) into its
/// capture instant. Returns `None` for anything malformed.
pub fn parse_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let stem = file_name.strip_suffix(".jpg")?;
    if stem.split('-').count() != 6 {
        return None;
    }
    NaiveDateTime::parse_from_str(stem, TIMESTAMP_FORMAT).ok()
}

/// Parse the instant out of a full frame path.
pub fn parse_frame_path(path: &Path) -> Option<NaiveDateTime> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(parse_timestamp)
}
