//! Task wiring for the lapse daemon.
//!
//! The binary in `main.rs` spawns a small fixed set of long-lived tasks:
//! the capture loop, the job scheduler, the single worker draining the
//! queue, and the share/stats background sweeps. Everything coordinates
//! through the SQLite job queue and shuts down via one cancellation
//! token.

pub mod background;
pub mod schedule;
pub mod worker;
