//! Incremental timelapse assembly.
//!
//! For each spec the assembler keeps a WebM artifact plus a sidecar file
//! naming the last frame incorporated. A run either fully (re)generates
//! the artifact from a concat manifest, appends the new frames one
//! segment at a time with stream-copy concat, or does nothing.
//!
//! Crash-safety invariant: the sidecar is advanced only after the append
//! that produced a new tail has been renamed over the artifact. A crash
//! mid-append therefore at worst repeats one frame on the next run; it
//! never skips one.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};

use crate::config::AppConfig;
use crate::error::Result;
use crate::ffmpeg;
use crate::frames::FrameStore;
use crate::status::RunStatus;
use crate::timelapse::{self, ResolvedSpec};

/// Name of the transient two-entry concat list used for appends.
const APPEND_LIST_NAME: &str = "concat_list.txt";

pub struct VideoAssembler {
    config: AppConfig,
    store: FrameStore,
    status: RunStatus,
}

impl VideoAssembler {
    pub fn new(config: AppConfig, store: FrameStore, status: RunStatus) -> Self {
        Self {
            config,
            store,
            status,
        }
    }

    /// Produce or update the artifact for `name` against the current
    /// frame set and wall clock.
    pub async fn assemble(&self, name: &str) -> Result<()> {
        self.assemble_at(name, Local::now().naive_local()).await
    }

    /// Like [`assemble`](Self::assemble) with an explicit target time.
    pub async fn assemble_at(&self, name: &str, now: NaiveDateTime) -> Result<()> {
        let spec = timelapse::resolve(name, now)?;

        let all_frames = self.store.list();
        if all_frames.is_empty() {
            tracing::info!(spec = %spec.name, "no snapshots available, nothing to assemble");
            return Ok(());
        }

        let selection = timelapse::select_frames(&all_frames, &spec);
        if selection.is_empty() {
            tracing::info!(spec = %spec.name, "no snapshots inside the window, skipping");
            return Ok(());
        }

        let artifact = self.artifact_path(&spec.name);
        let tail = read_sidecar(self.store.data_dir(), &spec.name);
        let start = start_index(&selection, tail.as_deref());

        if !has_content(&artifact) || start == 0 {
            tracing::info!(
                spec = %spec.name,
                frames = selection.len(),
                "full regeneration (artifact missing/empty or tail unknown)"
            );
            self.regenerate_full(&spec, &selection, &artifact, now).await
        } else if start < selection.len() {
            tracing::info!(
                spec = %spec.name,
                new_frames = selection.len() - start,
                "incremental append"
            );
            self.append_frames(&spec, &selection[start..], &artifact, now)
                .await
        } else {
            tracing::debug!(spec = %spec.name, "no new frames to append");
            Ok(())
        }
    }

    fn artifact_path(&self, spec_name: &str) -> PathBuf {
        self.store
            .data_dir()
            .join(format!("timelapse_{spec_name}.webm"))
    }

    /// Rebuild the artifact from scratch out of the full selection.
    async fn regenerate_full(
        &self,
        spec: &ResolvedSpec,
        selection: &[PathBuf],
        artifact: &Path,
        now: NaiveDateTime,
    ) -> Result<()> {
        let data_dir = self.store.data_dir();
        let list_name = format!("image_list_{}.txt", spec.name);
        let temp_name = format!("temp_timelapse_{}.webm", spec.name);
        let list_path = data_dir.join(&list_name);

        fs::write(&list_path, full_manifest(selection, data_dir))?;

        let caps = ffmpeg::encoder_caps().await;
        let log_path = self.config.ffmpeg_log_path(now.date());
        let args = ffmpeg::full_build_args(&list_name, &temp_name, caps, self.config.crf_value());
        let run = ffmpeg::run(&args, Some(data_dir), &log_path).await;
        let _ = fs::remove_file(&list_path);
        run?;

        // Archive the previous artifact before replacing it. An archive
        // failure is not fatal; the replacement still goes through.
        if artifact.exists() {
            let archive = data_dir.join(archive_name(&spec.name, now));
            tracing::info!(archive = %archive.display(), "archiving previous artifact");
            if let Err(err) = fs::rename(artifact, &archive) {
                tracing::warn!(error = %err, "failed to archive previous artifact");
            }
        }
        fs::rename(data_dir.join(&temp_name), artifact)?;

        if let Some(last) = selection.last() {
            write_sidecar(data_dir, &spec.name, last)?;
        }
        Ok(())
    }

    /// Append each new frame as a one-frame segment, stream-copied onto
    /// the artifact. The sidecar advances frame by frame so an aborted
    /// run resumes exactly where it stopped.
    async fn append_frames(
        &self,
        spec: &ResolvedSpec,
        new_frames: &[PathBuf],
        artifact: &Path,
        now: NaiveDateTime,
    ) -> Result<()> {
        let data_dir = self.store.data_dir();
        let caps = ffmpeg::encoder_caps().await;
        let crf = self.config.crf_value();
        let log_path = self.config.ffmpeg_log_path(now.date());
        let artifact_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        for (index, frame) in new_frames.iter().enumerate() {
            let frame_name = frame
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.status.set_current_file(&frame_name);
            tracing::info!(
                spec = %spec.name,
                frame = %frame_name,
                position = index + 1,
                total = new_frames.len(),
                "appending snapshot"
            );

            let segment_name = format!("temp_segment_{}_{index}.webm", spec.name);
            let segment_path = data_dir.join(&segment_name);
            let segment_args = ffmpeg::segment_args(frame, &segment_path, caps, crf);
            ffmpeg::run(&segment_args, None, &log_path).await?;

            let temp_name = format!("temp_concat_video_{}_{index}.webm", spec.name);
            let list_path = data_dir.join(APPEND_LIST_NAME);
            fs::write(&list_path, append_manifest(&artifact_name, &segment_name))?;

            let concat_args = ffmpeg::copy_concat_args(APPEND_LIST_NAME, &temp_name);
            let concat = ffmpeg::run(&concat_args, Some(data_dir), &log_path).await;
            let _ = fs::remove_file(&segment_path);
            let _ = fs::remove_file(&list_path);
            concat?;

            fs::rename(data_dir.join(&temp_name), artifact)?;
            write_sidecar(data_dir, &spec.name, frame)?;
        }
        Ok(())
    }
}

/// Index of the first frame not yet incorporated. Zero when the sidecar
/// is empty or names a frame that is no longer part of the selection --
/// both force a full regeneration.
pub fn start_index(selection: &[PathBuf], tail: Option<&str>) -> usize {
    match tail {
        None | Some("") => 0,
        Some(tail) => selection
            .iter()
            .position(|path| path.to_string_lossy() == tail)
            .map(|pos| pos + 1)
            .unwrap_or(0),
    }
}

/// Concat manifest for a full build: every frame relative to the data
/// dir with a fixed per-frame duration, and the final frame repeated
/// without one so it renders for its full slot.
pub fn full_manifest(selection: &[PathBuf], data_dir: &Path) -> String {
    let mut manifest = String::new();
    for frame in selection {
        let Ok(relative) = frame.strip_prefix(data_dir) else {
            tracing::warn!(frame = %frame.display(), "frame outside the data dir, skipping");
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        manifest.push_str(&format!("file '{relative}'\n"));
        manifest.push_str(&format!("duration {}\n", ffmpeg::FRAME_DURATION));
    }
    if let Some(last) = selection.last() {
        if let Ok(relative) = last.strip_prefix(data_dir) {
            let relative = relative.to_string_lossy().replace('\\', "/");
            manifest.push_str(&format!("file '{relative}'\n"));
        }
    }
    manifest
}

/// Two-entry concat manifest for an incremental append.
pub fn append_manifest(artifact_name: &str, segment_name: &str) -> String {
    format!("file '{artifact_name}'\nfile '{segment_name}'\n")
}

/// Archive file name for a replaced artifact.
pub fn archive_name(spec_name: &str, at: NaiveDateTime) -> String {
    format!("timelapse_{spec_name}_{}.webm", at.format("%Y%m%d_%H%M%S"))
}

/// Whether the artifact exists and is non-empty. A zero-byte artifact is
/// treated as missing so a previous hard failure regenerates cleanly.
pub fn has_content(path: &Path) -> bool {
    fs::metadata(path).map(|meta| meta.len() > 0).unwrap_or(false)
}

/// Sidecar path for a spec.
pub fn sidecar_path(data_dir: &Path, spec_name: &str) -> PathBuf {
    data_dir.join(format!("timelapse_{spec_name}.last_snapshot.txt"))
}

/// Read the sidecar. Absence or unreadability both yield `None`, which
/// forces a full regeneration rather than failing the job.
pub fn read_sidecar(data_dir: &Path, spec_name: &str) -> Option<String> {
    match fs::read_to_string(sidecar_path(data_dir, spec_name)) {
        Ok(content) => {
            let trimmed = content.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            tracing::warn!(spec = spec_name, error = %err, "unreadable sidecar, forcing full regeneration");
            None
        }
    }
}

/// Record the last frame incorporated into the artifact.
pub fn write_sidecar(data_dir: &Path, spec_name: &str, frame: &Path) -> Result<()> {
    fs::write(
        sidecar_path(data_dir, spec_name),
        frame.to_string_lossy().as_bytes(),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn frame(name: &str) -> PathBuf {
        PathBuf::from(format!("/data/snapshots/2025-01/02/07/{name}.jpg"))
    }

    fn test_config(data_dir: &Path) -> AppConfig {
        AppConfig::with_data_dir(data_dir.to_path_buf())
    }

    #[test]
    fn start_index_without_tail_is_zero() {
        let selection = vec![frame("2025-01-02-06-00-00"), frame("2025-01-02-06-10-00")];
        assert_eq!(start_index(&selection, None), 0);
        assert_eq!(start_index(&selection, Some("")), 0);
    }

    #[test]
    fn start_index_resumes_after_tail() {
        let selection = vec![
            frame("2025-01-02-06-00-00"),
            frame("2025-01-02-06-10-00"),
            frame("2025-01-02-06-20-00"),
        ];
        let tail = selection[1].to_string_lossy().into_owned();
        assert_eq!(start_index(&selection, Some(&tail)), 2);
    }

    #[test]
    fn start_index_at_tail_of_selection_means_no_work() {
        let selection = vec![frame("2025-01-02-06-00-00"), frame("2025-01-02-06-10-00")];
        let tail = selection[1].to_string_lossy().into_owned();
        assert_eq!(start_index(&selection, Some(&tail)), selection.len());
    }

    #[test]
    fn start_index_with_vanished_tail_forces_full_regeneration() {
        let selection = vec![frame("2025-01-02-06-10-00")];
        assert_eq!(
            start_index(&selection, Some("/data/snapshots/gone/2025-01-01-00-00-00.jpg")),
            0
        );
    }

    #[test]
    fn full_manifest_repeats_final_frame() {
        let data_dir = PathBuf::from("/data");
        let selection = vec![frame("2025-01-02-06-00-00"), frame("2025-01-02-06-10-00")];
        let manifest = full_manifest(&selection, &data_dir);
        assert_eq!(
            manifest,
            "file 'snapshots/2025-01/02/07/2025-01-02-06-00-00.jpg'\n\
             duration 0.0333\n\
             file 'snapshots/2025-01/02/07/2025-01-02-06-10-00.jpg'\n\
             duration 0.0333\n\
             file 'snapshots/2025-01/02/07/2025-01-02-06-10-00.jpg'\n"
        );
    }

    #[test]
    fn append_manifest_lists_artifact_then_segment() {
        assert_eq!(
            append_manifest("timelapse_1_week.webm", "temp_segment_1_week_0.webm"),
            "file 'timelapse_1_week.webm'\nfile 'temp_segment_1_week_0.webm'\n"
        );
    }

    #[test]
    fn archive_name_embeds_timestamp() {
        let at = NaiveDateTime::parse_from_str("2025-01-02 07:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(
            archive_name("1_week", at),
            "timelapse_1_week_20250102_073000.webm"
        );
    }

    #[test]
    fn sidecar_round_trip() {
        let dir = TempDir::new().unwrap();
        let frame = frame("2025-01-02-07-30-00");

        assert_eq!(read_sidecar(dir.path(), "1_week"), None);
        write_sidecar(dir.path(), "1_week", &frame).unwrap();
        assert_eq!(
            read_sidecar(dir.path(), "1_week").as_deref(),
            Some(frame.to_string_lossy().as_ref())
        );
    }

    #[test]
    fn empty_sidecar_reads_as_none() {
        let dir = TempDir::new().unwrap();
        fs::write(sidecar_path(dir.path(), "1_week"), "  \n").unwrap();
        assert_eq!(read_sidecar(dir.path(), "1_week"), None);
    }

    #[test]
    fn zero_byte_artifact_counts_as_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("timelapse_1_week.webm");
        assert!(!has_content(&path));
        fs::write(&path, b"").unwrap();
        assert!(!has_content(&path));
        fs::write(&path, b"webm").unwrap();
        assert!(has_content(&path));
    }

    #[tokio::test]
    async fn assemble_with_no_frames_is_a_successful_noop() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        fs::create_dir_all(&config.snapshots_dir).unwrap();
        let store = FrameStore::new(&config);
        let assembler = VideoAssembler::new(config, store, RunStatus::new());

        assembler.assemble("1_week").await.unwrap();
        assert!(!dir.path().join("timelapse_1_week.webm").exists());
    }

    #[tokio::test]
    async fn assemble_with_up_to_date_sidecar_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        let store = FrameStore::new(&config);
        let now = NaiveDateTime::parse_from_str("2025-01-02 08:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let instant =
            NaiveDateTime::parse_from_str("2025-01-02 07:30:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let frame_path = store.put(instant, b"jpeg").unwrap();

        // Artifact present and sidecar already names the only frame: the
        // assembler must return without touching anything.
        let artifact = dir.path().join("timelapse_24_hour_2025-01-02.webm");
        fs::write(&artifact, b"webm").unwrap();
        write_sidecar(dir.path(), "24_hour_2025-01-02", &frame_path).unwrap();

        let assembler = VideoAssembler::new(config, store, RunStatus::new());
        assembler
            .assemble_at("24_hour_2025-01-02", now)
            .await
            .unwrap();

        assert_eq!(fs::read(&artifact).unwrap(), b"webm");
        assert_eq!(
            read_sidecar(dir.path(), "24_hour_2025-01-02").as_deref(),
            Some(frame_path.to_string_lossy().as_ref())
        );
    }

    #[tokio::test]
    async fn assemble_unknown_spec_fails() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        fs::create_dir_all(&config.snapshots_dir).unwrap();
        let store = FrameStore::new(&config);
        store
            .put(
                NaiveDateTime::parse_from_str("2025-01-02 07:30:00", "%Y-%m-%d %H:%M:%S").unwrap(),
                b"jpeg",
            )
            .unwrap();
        let assembler = VideoAssembler::new(config, store, RunStatus::new());

        assert!(assembler.assemble("2_week").await.is_err());
    }
}
