//! File-change detection for the SLA target table.
//!
//! The engine itself has no dependency on how change is detected; this
//! task polls the source file's mtime and calls `reload()` when it moves.

use crate::store::SlaConfigStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn a background task that reloads `store` whenever the file at
/// `path` changes. Abort the returned handle to stop watching.
pub fn spawn_file_watcher(
    store: Arc<SlaConfigStore>,
    path: PathBuf,
    poll_interval: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_mtime: Option<SystemTime> = mtime_of(&path);
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(path = %path.display(), "SLA config watcher started");
        loop {
            interval.tick().await;

            let mtime = mtime_of(&path);
            if mtime == last_mtime {
                continue;
            }
            last_mtime = mtime;

            debug!(path = %path.display(), "SLA config file changed");
            // A failed reload keeps the active version; nothing to do
            // here beyond what the store already logged.
            let _ = store.reload();
        }
    })
}

fn mtime_of(path: &std::path::Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
