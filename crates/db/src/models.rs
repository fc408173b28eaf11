//! Row types and string-keyed enums for the persistence layer.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A queued unit of work. Rows are deleted once processed, so the table
/// only ever holds the backlog.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub job_type: String,
    pub payload: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Typed job dispatch. The database stores the string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    Assemble,
    SweepFrames,
    SweepVideos,
    SweepLogs,
    SweepGallery,
    SweepShares,
}

impl JobType {
    /// Every job type, in the order the scheduler enqueues the sweeps.
    pub const SWEEPS: [JobType; 5] = [
        Self::SweepFrames,
        Self::SweepVideos,
        Self::SweepLogs,
        Self::SweepGallery,
        Self::SweepShares,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assemble => "assemble",
            Self::SweepFrames => "sweep-frames",
            Self::SweepVideos => "sweep-videos",
            Self::SweepLogs => "sweep-logs",
            Self::SweepGallery => "sweep-gallery",
            Self::SweepShares => "sweep-shares",
        }
    }

    /// Parse the database string form. Unknown strings yield `None` so
    /// the worker can fail the job rather than panic.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "assemble" => Some(Self::Assemble),
            "sweep-frames" => Some(Self::SweepFrames),
            "sweep-videos" => Some(Self::SweepVideos),
            "sweep-logs" => Some(Self::SweepLogs),
            "sweep-gallery" => Some(Self::SweepGallery),
            "sweep-shares" => Some(Self::SweepShares),
            _ => None,
        }
    }
}

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Payload of an `assemble` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblePayload {
    pub timelapse_name: String,
}

/// A time-limited public link to one artifact.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SharedLink {
    pub id: i64,
    pub token: String,
    pub file_path: String,
    pub expires_at: NaiveDateTime,
}

/// An account row, without the password hash.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
}
