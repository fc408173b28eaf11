//! Process-wide generation status shared between the worker and the
//! external dashboard. Writers hold the lock briefly; readers get a
//! point-in-time snapshot copy.

use std::sync::{Arc, RwLock};

use chrono::NaiveDateTime;
use serde::Serialize;

/// A point-in-time copy of the run status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatusSnapshot {
    pub is_running: bool,
    pub last_run: Option<NaiveDateTime>,
    pub error: Option<String>,
    pub currently_generating: Option<String>,
    pub current_file: Option<String>,
}

/// Shared handle to the run status. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct RunStatus {
    inner: Arc<RwLock<RunStatusSnapshot>>,
}

impl RunStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a job as started. Clears the previous error.
    pub fn begin(&self, generating: &str) {
        let mut inner = self.inner.write().unwrap();
        inner.is_running = true;
        inner.error = None;
        inner.currently_generating = Some(generating.to_string());
        inner.current_file = None;
    }

    /// Record the frame currently being encoded.
    pub fn set_current_file(&self, file: &str) {
        self.inner.write().unwrap().current_file = Some(file.to_string());
    }

    /// Mark the current job as finished, recording the run time and any
    /// terminal error.
    pub fn finish(&self, at: NaiveDateTime, error: Option<String>) {
        let mut inner = self.inner.write().unwrap();
        inner.is_running = false;
        inner.last_run = Some(at);
        inner.error = error;
        inner.currently_generating = None;
        inner.current_file = None;
    }

    pub fn snapshot(&self) -> RunStatusSnapshot {
        self.inner.read().unwrap().clone()
    }
}
