//! Read models for the external dashboard: frame catalog figures, the
//! hourly gallery, the timelapse catalog, and a periodically refreshed
//! snapshot of all of them so page loads never trigger a full tree walk.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use walkdir::WalkDir;

use crate::capture::{CameraClient, CameraStatus};
use crate::frames::{self, FrameStore};
use crate::status::RunStatus;
use crate::timelapse::{daily_spec_name, SPECS};

/// One cell of the 24-slot daily gallery strip.
#[derive(Debug, Clone, Serialize)]
pub struct GallerySlot {
    pub time: String,
    pub url: String,
    pub available: bool,
}

/// One entry of the timelapse catalog.
#[derive(Debug, Clone, Serialize)]
pub struct TimelapseEntry {
    pub name: String,
    pub file_name: String,
    pub path: String,
}

/// Number of frames currently on disk.
pub fn frame_count(store: &FrameStore) -> usize {
    store.list().len()
}

/// Capture instant of the most recent frame, if any.
pub fn last_frame_time(store: &FrameStore) -> Option<NaiveDateTime> {
    store
        .list()
        .last()
        .and_then(|path| frames::parse_frame_path(path))
}

/// Total bytes under the data dir.
pub fn disk_usage_bytes(data_dir: &Path) -> u64 {
    WalkDir::new(data_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}

/// Human-readable byte count.
pub fn human_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let bytes = bytes as f64;
    if bytes >= GB {
        format!("{:.2} GB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes / KB)
    } else {
        format!("{bytes} Bytes")
    }
}

/// Distinct dates with at least one gallery slot, newest first.
pub fn available_gallery_dates(store: &FrameStore) -> Vec<String> {
    let Ok(entries) = fs::read_dir(store.gallery_dir()) else {
        return Vec::new();
    };
    let dates: BTreeSet<String> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| name.ends_with(".jpg") && name.len() >= 13)
        .map(|name| name[..10].to_string())
        .collect();
    dates.into_iter().rev().collect()
}

/// The 24 gallery slots for one date. Slots without an image are marked
/// unavailable so the dashboard can grey them out.
pub fn daily_gallery(store: &FrameStore, date: &str) -> Vec<GallerySlot> {
    (0..24)
        .map(|hour| {
            let file_name = format!("{date}-{hour:02}.jpg");
            let available = store.gallery_dir().join(&file_name).exists();
            GallerySlot {
                time: format!("{hour:02}:00"),
                url: if available {
                    format!("/data/gallery/{file_name}")
                } else {
                    String::new()
                },
                available,
            }
        })
        .collect()
}

/// Existing timelapse artifacts: the static rollups plus the recent
/// per-day videos, in catalog order.
pub fn timelapse_catalog(data_dir: &Path, recent_days: i64, today: NaiveDate) -> Vec<TimelapseEntry> {
    let mut names: Vec<String> = SPECS.iter().map(|spec| spec.name.to_string()).collect();
    for offset in 0..recent_days {
        names.push(daily_spec_name(today - Duration::days(offset)));
    }

    names
        .into_iter()
        .filter_map(|name| {
            let file_name = format!("timelapse_{name}.webm");
            data_dir.join(&file_name).exists().then(|| TimelapseEntry {
                name: name.replace('_', " "),
                path: format!("/data/{file_name}"),
                file_name,
            })
        })
        .collect()
}

/// A full point-in-time statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub total_images: usize,
    pub image_size: String,
    pub last_image_time: Option<String>,
    pub last_processed_image: Option<String>,
    pub available_dates: Vec<String>,
    pub daily_gallery: Vec<GallerySlot>,
    pub timelapses: Vec<TimelapseEntry>,
    pub camera_status: CameraStatus,
    pub is_loading: bool,
}

impl StatsSnapshot {
    /// Placeholder served before the first refresh completes.
    fn loading() -> Self {
        Self {
            total_images: 0,
            image_size: "Loading...".into(),
            last_image_time: None,
            last_processed_image: None,
            available_dates: Vec::new(),
            daily_gallery: Vec::new(),
            timelapses: Vec::new(),
            camera_status: CameraStatus::default(),
            is_loading: true,
        }
    }
}

/// Shared cache of the stats snapshot, refreshed by a background task.
#[derive(Clone, Default)]
pub struct CachedStats {
    inner: Arc<RwLock<Option<StatsSnapshot>>>,
}

impl CachedStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, or the loading placeholder before the first
    /// refresh lands.
    pub fn get(&self) -> StatsSnapshot {
        self.inner
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(StatsSnapshot::loading)
    }

    /// Recompute every read model and swap the snapshot in.
    pub async fn refresh(
        &self,
        store: &FrameStore,
        run_status: &RunStatus,
        camera: &CameraClient,
        recent_days: i64,
        today: NaiveDate,
    ) {
        let camera_status = match camera.fetch_status().await {
            Ok(status) => status,
            Err(err) => CameraStatus {
                state: format!("API ERROR: {err}"),
                ..CameraStatus::default()
            },
        };

        let run = run_status.snapshot();
        let snapshot = StatsSnapshot {
            total_images: frame_count(store),
            image_size: human_bytes(disk_usage_bytes(store.data_dir())),
            last_image_time: last_frame_time(store)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            last_processed_image: run
                .last_run
                .map(|t| format!("{}.jpg", t.format("%Y-%m-%d-%H-%M-%S"))),
            available_dates: available_gallery_dates(store),
            daily_gallery: daily_gallery(store, &today.format("%Y-%m-%d").to_string()),
            timelapses: timelapse_catalog(store.data_dir(), recent_days, today),
            camera_status,
            is_loading: false,
        };

        *self.inner.write().unwrap() = Some(snapshot);
    }
}
