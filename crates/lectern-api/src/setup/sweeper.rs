//! Session TTL sweep.
//!
//! Deletes expired upload sessions and releases their scratch storage on an
//! interval, for the lifetime of the process. The sweep is advisory cleanup:
//! finalize re-validates completeness on its own, and consuming the session
//! row first keeps the sweep from racing an in-flight finalize.

use crate::services::upload::UploadService;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Spawn the sweep loop; runs until the process exits.
pub fn spawn_session_sweeper(upload: UploadService, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(interval_secs, "Session sweeper started");
        loop {
            interval.tick().await;
            match upload.sweep_expired().await {
                Ok(0) => {}
                Ok(swept) => {
                    tracing::info!(swept, "Expired upload sessions released");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Session sweep failed");
                }
            }
        }
    })
}
