//! Long-lived background tasks spawned at startup: the snapshot capture
//! loop, share-link expiry, and the cached stats refresher.

pub mod capture;
pub mod share_sweep;
pub mod stats_refresh;
