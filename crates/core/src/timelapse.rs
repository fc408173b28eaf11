//! Timelapse catalog and frame selection.
//!
//! A spec is a named (window, stride) pair. The static catalog covers the
//! rolling week/month/year views; per-day specs (`24_hour_YYYY-MM-DD`) are
//! materialized dynamically for recent calendar days.

use std::path::PathBuf;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{CoreError, Result};
use crate::frames;

/// Name prefix of dynamically materialized per-day specs.
pub const DAILY_SPEC_PREFIX: &str = "24_hour_";

/// Frame sub-sampling rule applied to the windowed frame set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePattern {
    /// Every frame in the window.
    All,
    /// First frame of every hour.
    Hourly,
    /// First frame of every day.
    Daily,
}

impl FramePattern {
    /// Length of the file-name prefix that identifies a stride bucket
    /// (`YYYY-MM-DD-HH` for hourly, `YYYY-MM-DD` for daily).
    fn bucket_prefix_len(self) -> Option<usize> {
        match self {
            Self::All => None,
            Self::Hourly => Some(13),
            Self::Daily => Some(10),
        }
    }
}

/// A statically configured timelapse variety.
#[derive(Debug, Clone, Copy)]
pub struct TimelapseSpec {
    pub name: &'static str,
    pub window_days: i64,
    pub pattern: FramePattern,
}

/// The fixed rollup catalog. Per-day specs are not listed here; they are
/// resolved from their name.
pub const SPECS: &[TimelapseSpec] = &[
    TimelapseSpec {
        name: "1_week",
        window_days: 7,
        pattern: FramePattern::Hourly,
    },
    TimelapseSpec {
        name: "1_month",
        window_days: 30,
        pattern: FramePattern::Daily,
    },
    TimelapseSpec {
        name: "1_year",
        window_days: 365,
        pattern: FramePattern::Daily,
    },
];

/// A spec resolved against a concrete target time: a half-open window
/// `[window_start, window_end)` plus the stride to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSpec {
    pub name: String,
    pub window_start: NaiveDateTime,
    pub window_end: NaiveDateTime,
    pub pattern: FramePattern,
}

/// Resolve a spec name. `24_hour_<date>` names cover exactly that calendar
/// day with every frame; all other names are looked up in the static
/// catalog and windowed back from `now`.
pub fn resolve(name: &str, now: NaiveDateTime) -> Result<ResolvedSpec> {
    if let Some(date_str) = name.strip_prefix(DAILY_SPEC_PREFIX) {
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|_| CoreError::UnknownTimelapse(name.to_string()))?;
        let start = date.and_time(NaiveTime::MIN);
        return Ok(ResolvedSpec {
            name: name.to_string(),
            window_start: start,
            window_end: start + Duration::days(1),
            pattern: FramePattern::All,
        });
    }

    let spec = SPECS
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| CoreError::UnknownTimelapse(name.to_string()))?;
    Ok(ResolvedSpec {
        name: name.to_string(),
        window_start: now - Duration::days(spec.window_days),
        window_end: now,
        pattern: spec.pattern,
    })
}

/// The daily spec name for a calendar date.
pub fn daily_spec_name(date: NaiveDate) -> String {
    format!("{DAILY_SPEC_PREFIX}{}", date.format("%Y-%m-%d"))
}

/// Select the ordered subset of frames a spec includes.
///
/// `all_frames` must already be in chronological (lexicographic) order.
/// Windowing keeps `window_start <= instant < window_end`. Striding is a
/// single chronological pass that retains a frame only when its bucket
/// prefix differs from the previously retained frame's prefix -- so the
/// same physical frame is chosen on every run as long as it still exists,
/// which is what the incremental assembler depends on. Malformed file
/// names are skipped.
pub fn select_frames(all_frames: &[PathBuf], spec: &ResolvedSpec) -> Vec<PathBuf> {
    let mut selected = Vec::new();
    let mut last_bucket: Option<String> = None;

    for path in all_frames {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(instant) = frames::parse_timestamp(name) else {
            continue;
        };
        if instant < spec.window_start || instant >= spec.window_end {
            continue;
        }

        match spec.pattern.bucket_prefix_len() {
            None => selected.push(path.clone()),
            Some(len) => {
                let bucket = &name[..len];
                if last_bucket.as_deref() != Some(bucket) {
                    last_bucket = Some(bucket.to_string());
                    selected.push(path.clone());
                }
            }
        }
    }

    selected
}
