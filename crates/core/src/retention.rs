//! Retention sweeps over frames, gallery slots, per-day videos, archived
//! rollups, and encoder logs.
//!
//! Every sweep is per-file fault tolerant: malformed names and individual
//! delete failures are logged and skipped, never escalated. Each sweep
//! returns the number of files it removed.

use std::fs;
use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::assembler;
use crate::frames::{self, FrameStore};
use crate::timelapse::{DAILY_SPEC_PREFIX, SPECS};

/// Encoder logs older than this many days are deleted.
const LOG_RETENTION_DAYS: i64 = 7;

/// Delete frames whose capture instant is older than the retention
/// horizon.
pub fn sweep_frames(store: &FrameStore, retention_days: i64, now: NaiveDateTime) -> usize {
    let cutoff = now - Duration::days(retention_days);
    let mut removed = 0;

    for path in store.list() {
        let Some(instant) = frames::parse_frame_path(&path) else {
            tracing::debug!(path = %path.display(), "skipping malformed snapshot name");
            continue;
        };
        if instant < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to remove snapshot")
                }
            }
        }
    }

    if removed > 0 {
        tracing::info!(removed, "snapshot cleanup complete");
    }
    removed
}

/// Delete gallery slots older than the gallery retention horizon.
pub fn sweep_gallery(store: &FrameStore, retention_days: i64, now: NaiveDateTime) -> usize {
    let cutoff = now - Duration::days(retention_days);
    let mut removed = 0;

    let Ok(entries) = fs::read_dir(store.gallery_dir()) else {
        return 0;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(instant) = parse_gallery_slot(name) else {
            tracing::debug!(name, "skipping malformed gallery name");
            continue;
        };
        if instant < cutoff {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(err) => {
                    tracing::warn!(name, error = %err, "failed to remove gallery image")
                }
            }
        }
    }

    if removed > 0 {
        tracing::info!(removed, "gallery cleanup complete");
    }
    removed
}

/// Delete per-day timelapses (and their sidecars) whose date is older
/// than the configured number of days.
pub fn sweep_daily_videos(data_dir: &Path, keep_days: i64, now: NaiveDateTime) -> usize {
    let cutoff = now.date() - Duration::days(keep_days);
    let mut removed = 0;

    let Ok(entries) = fs::read_dir(data_dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(date) = parse_daily_video_name(name) else {
            continue;
        };
        if date < cutoff {
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    removed += 1;
                    let spec_name = format!("{DAILY_SPEC_PREFIX}{}", date.format("%Y-%m-%d"));
                    let _ = fs::remove_file(assembler::sidecar_path(data_dir, &spec_name));
                }
                Err(err) => {
                    tracing::warn!(name, error = %err, "failed to remove per-day timelapse")
                }
            }
        }
    }

    if removed > 0 {
        tracing::info!(removed, "per-day timelapse cleanup complete");
    }
    removed
}

/// For each rollup spec, keep only the newest `archives_to_keep`
/// timestamp-suffixed archives. The timestamp makes lexicographic order
/// chronological, so the head of the sorted list is the oldest.
pub fn sweep_archives(data_dir: &Path, archives_to_keep: usize) -> usize {
    let mut removed = 0;

    for spec in SPECS {
        let prefix = format!("timelapse_{}_", spec.name);
        let mut archives: Vec<String> = Vec::new();

        let Ok(entries) = fs::read_dir(data_dir) else {
            return removed;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if is_archive_name(name, &prefix) {
                archives.push(name.to_string());
            }
        }

        if archives.len() <= archives_to_keep {
            continue;
        }
        archives.sort();

        let delete_count = archives.len() - archives_to_keep;
        for name in &archives[..delete_count] {
            match fs::remove_file(data_dir.join(name)) {
                Ok(()) => removed += 1,
                Err(err) => {
                    tracing::warn!(name, error = %err, "failed to remove archived timelapse")
                }
            }
        }
        tracing::info!(spec = spec.name, removed = delete_count, "archive cleanup complete");
    }

    removed
}

/// Delete daily encoder logs older than a week.
pub fn sweep_logs(data_dir: &Path, now: NaiveDateTime) -> usize {
    let cutoff = now.date() - Duration::days(LOG_RETENTION_DAYS);
    let mut removed = 0;

    let Ok(entries) = fs::read_dir(data_dir) else {
        return 0;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(date) = name
            .strip_prefix("ffmpeg_log_")
            .and_then(|rest| rest.strip_suffix(".txt"))
            .and_then(|stamp| NaiveDate::parse_from_str(stamp, "%Y-%m-%d").ok())
        else {
            continue;
        };
        if date < cutoff {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(err) => tracing::warn!(name, error = %err, "failed to remove encoder log"),
            }
        }
    }

    if removed > 0 {
        tracing::info!(removed, "encoder log cleanup complete");
    }
    removed
}

/// Parse `YYYY-MM-DD-HH.jpg` into the start of that gallery hour.
fn parse_gallery_slot(name: &str) -> Option<NaiveDateTime> {
    let stem = name.strip_suffix(".jpg")?;
    if stem.len() != 13 || stem.as_bytes()[10] != b'-' {
        return None;
    }
    let date = NaiveDate::parse_from_str(&stem[..10], "%Y-%m-%d").ok()?;
    let hour: u32 = stem[11..13].parse().ok()?;
    date.and_hms_opt(hour, 0, 0)
}

/// Parse `timelapse_24_hour_YYYY-MM-DD.webm` into its date.
fn parse_daily_video_name(name: &str) -> Option<NaiveDate> {
    let stamp = name
        .strip_prefix("timelapse_24_hour_")?
        .strip_suffix(".webm")?;
    NaiveDate::parse_from_str(stamp, "%Y-%m-%d").ok()
}

/// Whether a file name is a timestamped archive for the given spec
/// prefix. The suffix must be exactly `YYYYMMDD_HHMMSS` so canonical
/// artifacts and unrelated files never match.
fn is_archive_name(name: &str, prefix: &str) -> bool {
    let Some(stamp) = name
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(".webm"))
    else {
        return false;
    };
    NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").is_ok()
}
