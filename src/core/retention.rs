// src/core/retention.rs

//! Removal of old per-scan result files.
//!
//! Scans started with an output directory write `results_{id}.txt`. The
//! engine only promises the file is complete once the scan is; how long it
//! is kept is decided here.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::models::ScanId;

const RESULTS_PREFIX: &str = "results_";
const RESULTS_SUFFIX: &str = ".txt";

/// Default age after which result files are deleted.
pub const DEFAULT_RESULTS_TTL: Duration = Duration::from_secs(60 * 60);

pub fn results_file_name(id: ScanId) -> String {
    format!("{RESULTS_PREFIX}{id}{RESULTS_SUFFIX}")
}

fn is_results_file(name: &str) -> bool {
    name.starts_with(RESULTS_PREFIX) && name.ends_with(RESULTS_SUFFIX)
}

/// Deletes result files in `dir` last modified more than `max_age` ago.
/// Returns the deleted paths. Files that vanish or cannot be removed
/// midway are logged and skipped.
pub async fn sweep_stale_results(dir: &Path, max_age: Duration) -> io::Result<Vec<PathBuf>> {
    let now = SystemTime::now();
    let mut removed = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_results_file(name) {
            continue;
        }

        let path = entry.path();
        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot stat result file.");
                continue;
            }
        };
        // A clock that went backwards yields an error here; treat as fresh.
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), age_secs = age.as_secs(), "Removed stale result file.");
                removed.push(path);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Cannot remove result file."),
        }
    }

    if !removed.is_empty() {
        info!(dir = %dir.display(), count = removed.len(), "Swept stale result files.");
    }
    Ok(removed)
}

/// Sweeps `dir` every `interval` until `cancel` fires.
pub fn spawn_retention_task(
    dir: PathBuf,
    max_age: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = sweep_stale_results(&dir, max_age).await {
                        warn!(dir = %dir.display(), error = %e, "Result sweep failed.");
                    }
                }
            }
        }
        debug!(dir = %dir.display(), "Retention task stopped.");
    })
}
