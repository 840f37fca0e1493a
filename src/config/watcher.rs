//! Polling-based file watcher.
//!
//! Checks a file's mtime every poll interval. When a change is detected it
//! debounces (editors often write in stages), then invokes the reload
//! callback. Used for the coefficient file so a re-exported model can be
//! picked up without a restart.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

/// Outcome of one reload attempt, reported by the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The file was reloaded; the payload describes what changed.
    Reloaded(String),
    /// Reload was attempted but failed (previous state remains active).
    Error(String),
}

/// Upper bound on the debounce delay after a change is seen.
const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

/// Run the watcher loop until `cancel` fires.
///
/// The callback runs on every stable mtime change, including the file
/// reappearing after having been deleted.
pub async fn run_file_watcher<F>(
    path: PathBuf,
    poll_interval: Duration,
    cancel: CancellationToken,
    mut reload: F,
) where
    F: FnMut(&Path) -> WatchEvent + Send,
{
    tracing::info!(path = %path.display(), poll_ms = poll_interval.as_millis() as u64, "File watcher started");

    let debounce = poll_interval.min(DEBOUNCE_DELAY);
    let mut last_mtime = get_mtime(&path);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(path = %path.display(), "File watcher stopping");
                return;
            }
            () = tokio::time::sleep(poll_interval) => {}
        }

        let Some(current) = get_mtime(&path) else {
            if last_mtime.is_some() {
                tracing::warn!(
                    path = %path.display(),
                    "Watched file not accessible, keeping current state, will retry"
                );
                last_mtime = None;
            }
            continue;
        };

        if last_mtime == Some(current) {
            continue;
        }

        tokio::time::sleep(debounce).await;
        if get_mtime(&path) != Some(current) {
            // Still being written; pick it up on the next poll.
            continue;
        }
        last_mtime = Some(current);

        match reload(&path) {
            WatchEvent::Reloaded(summary) => {
                tracing::info!(path = %path.display(), %summary, "Watched file reloaded");
            }
            WatchEvent::Error(e) => {
                tracing::error!(path = %path.display(), error = %e, "Reload failed, keeping previous state");
            }
        }
    }
}

/// Read the modification time of a file, returning None on any error.
fn get_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}
