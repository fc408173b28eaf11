/// Domain-level error type for the capture/assembly pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("camera request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("camera API returned status {status}: {body}")]
    CameraApi { status: u16, body: String },

    #[error("camera credentials missing (host, API key, or camera id unset)")]
    CameraUnconfigured,

    #[error("ffmpeg exited with code {exit_code:?}: {log_tail}")]
    Encoder {
        exit_code: Option<i32>,
        log_tail: String,
    },

    #[error("no timelapse configuration found for '{0}'")]
    UnknownTimelapse(String),

    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
