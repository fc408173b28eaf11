//! FFmpeg invocation for timelapse assembly.
//!
//! Everything that shells out to the transcoder lives here: one-shot
//! encoder discovery, single-frame segment encoding, the full concat
//! build, and the stream-copy concat used for incremental appends. All
//! ffmpeg output is appended to the daily encoder log file; failures
//! carry the tail of that log.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::error::{CoreError, Result};

/// Output framerate of every artifact and segment.
pub const FRAME_RATE: &str = "30";

/// Display duration of a single frame at 30 fps, as ffmpeg expects it.
pub const FRAME_DURATION: &str = "0.0333";

/// Video filter applied to full builds and segments alike. Segment and
/// artifact streams must match byte-for-byte-compatible parameters
/// (pixel format, color range, resolution) or the stream-copy concat
/// produces broken output.
const VIDEO_FILTER: &str = "scale=out_color_matrix=bt709:out_range=tv,format=yuv420p";

/// Encoder thread ceiling regardless of core count.
const MAX_THREADS: usize = 8;

/// How much of the encoder log a failure carries back.
const LOG_TAIL_BYTES: u64 = 2048;

static CAPABILITIES: OnceCell<EncoderCaps> = OnceCell::const_new();

/// Detected transcoder capabilities, computed once per process.
#[derive(Debug, Clone)]
pub struct EncoderCaps {
    pub codec: &'static str,
    pub threads: usize,
}

/// Probe the transcoder once and cache the result for the process
/// lifetime. Preference order: SVT-AV1, AOM-AV1, then VP9 as the
/// always-available fallback.
pub async fn encoder_caps() -> &'static EncoderCaps {
    CAPABILITIES.get_or_init(detect_capabilities).await
}

async fn detect_capabilities() -> EncoderCaps {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_THREADS);

    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .await;

    let codec = match output {
        Ok(out) if out.status.success() => {
            let listing = String::from_utf8_lossy(&out.stdout);
            if listing.contains("libsvtav1") {
                "libsvtav1"
            } else if listing.contains("libaom-av1") {
                "libaom-av1"
            } else {
                "libvpx-vp9"
            }
        }
        _ => {
            tracing::warn!("could not probe ffmpeg encoders, falling back to libvpx-vp9");
            "libvpx-vp9"
        }
    };

    tracing::info!(codec, threads, "detected ffmpeg capabilities");
    EncoderCaps { codec, threads }
}

/// Arguments to encode a single frame into a one-frame WebM segment.
///
/// Parameters are aligned with [`full_build_args`] so that segments can
/// later be concatenated onto the artifact with stream copy.
pub fn segment_args(image: &Path, segment: &Path, caps: &EncoderCaps, crf: &str) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-loop".into(),
        "1".into(),
        "-i".into(),
        image.to_string_lossy().into_owned(),
        "-t".into(),
        FRAME_DURATION.into(),
        "-r".into(),
        FRAME_RATE.into(),
        "-c:v".into(),
        caps.codec.into(),
    ];
    if caps.codec == "libsvtav1" {
        args.extend(["-preset".into(), "8".into()]);
    }
    args.extend([
        "-threads".into(),
        caps.threads.to_string(),
        "-g".into(),
        "1".into(),
        "-keyint_min".into(),
        "1".into(),
        "-crf".into(),
        crf.into(),
        "-vf".into(),
        VIDEO_FILTER.into(),
        "-an".into(),
        "-f".into(),
        "webm".into(),
        "-y".into(),
        segment.to_string_lossy().into_owned(),
    ]);
    args
}

/// Arguments for a full concat-demuxer build from an image manifest.
/// Paths are relative to the data dir; the command runs with the data
/// dir as working directory.
pub fn full_build_args(list_name: &str, output_name: &str, caps: &EncoderCaps, crf: &str) -> Vec<String> {
    vec![
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_name.into(),
        "-r".into(),
        FRAME_RATE.into(),
        "-c:v".into(),
        caps.codec.into(),
        "-b:v".into(),
        "0".into(),
        "-crf".into(),
        crf.into(),
        "-vf".into(),
        VIDEO_FILTER.into(),
        "-y".into(),
        output_name.into(),
    ]
}

/// Arguments to concatenate the current artifact and a fresh segment via
/// stream copy. No re-encode happens here -- the segment was produced with
/// matching parameters, so the copy is cheap and lossless.
pub fn copy_concat_args(list_name: &str, output_name: &str) -> Vec<String> {
    vec![
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_name.into(),
        "-c".into(),
        "copy".into(),
        "-y".into(),
        output_name.into(),
    ]
}

/// Run ffmpeg with stdout/stderr appended to the encoder log file. A
/// non-zero exit becomes [`CoreError::Encoder`] carrying the log tail.
pub async fn run(args: &[String], working_dir: Option<&Path>, log_path: &Path) -> Result<()> {
    let log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    let log_err = log.try_clone()?;

    let mut cmd = Command::new("ffmpeg");
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }

    let status = cmd.status().await?;
    if !status.success() {
        return Err(CoreError::Encoder {
            exit_code: status.code(),
            log_tail: log_tail(log_path),
        });
    }
    Ok(())
}

/// Last chunk of the encoder log, for error reporting.
fn log_tail(log_path: &Path) -> String {
    let Ok(bytes) = std::fs::read(log_path) else {
        return String::new();
    };
    let skip = bytes.len().saturating_sub(LOG_TAIL_BYTES as usize);
    String::from_utf8_lossy(&bytes[skip..]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn caps(codec: &'static str) -> EncoderCaps {
        EncoderCaps { codec, threads: 4 }
    }

    #[test]
    fn segment_args_align_with_full_build() {
        let args = segment_args(
            &PathBuf::from("/data/snapshots/a.jpg"),
            &PathBuf::from("/data/temp_segment_1_week_0.webm"),
            &caps("libvpx-vp9"),
            "28",
        );
        let full = full_build_args("image_list_1_week.txt", "temp_timelapse_1_week.webm", &caps("libvpx-vp9"), "28");

        // Same codec, CRF, framerate, and filter on both paths.
        for key in ["-c:v", "-crf", "-r", "-vf"] {
            let seg_val = args.iter().position(|a| a == key).map(|i| &args[i + 1]);
            let full_val = full.iter().position(|a| a == key).map(|i| &full[i + 1]);
            assert_eq!(seg_val, full_val, "{key} must match between segment and full build");
        }
    }

    #[test]
    fn segment_is_one_frame_keyframe_only() {
        let args = segment_args(
            &PathBuf::from("a.jpg"),
            &PathBuf::from("s.webm"),
            &caps("libvpx-vp9"),
            "28",
        );
        let joined = args.join(" ");
        assert!(joined.contains("-loop 1"));
        assert!(joined.contains("-t 0.0333"));
        assert!(joined.contains("-g 1"));
        assert!(joined.contains("-keyint_min 1"));
        assert!(joined.contains("-an"));
        assert!(joined.contains("-f webm"));
    }

    #[test]
    fn svt_av1_gets_preset() {
        let args = segment_args(
            &PathBuf::from("a.jpg"),
            &PathBuf::from("s.webm"),
            &caps("libsvtav1"),
            "28",
        );
        assert!(args.join(" ").contains("-preset 8"));

        let vp9 = segment_args(
            &PathBuf::from("a.jpg"),
            &PathBuf::from("s.webm"),
            &caps("libvpx-vp9"),
            "28",
        );
        assert!(!vp9.join(" ").contains("-preset"));
    }

    #[test]
    fn copy_concat_uses_stream_copy() {
        let args = copy_concat_args("concat_list.txt", "temp.webm");
        let joined = args.join(" ");
        assert!(joined.contains("-f concat -safe 0"));
        assert!(joined.contains("-c copy"));
        assert!(!joined.contains("-crf"));
    }

    #[test]
    fn full_build_uses_crf_rate_control() {
        let args = full_build_args("list.txt", "out.webm", &caps("libaom-av1"), "20");
        let joined = args.join(" ");
        assert!(joined.contains("-b:v 0"));
        assert!(joined.contains("-crf 20"));
        assert!(joined.contains("-c:v libaom-av1"));
    }
}
