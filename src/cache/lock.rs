//! Per-key build locks
//!
//! Two invocations racing to build the same cache key would duplicate work
//! and could interleave store writes. A lock file named after the key
//! serializes them: the loser waits, then re-checks the store and usually
//! finds the winner's image.

use crate::error::{StevedoreError, StevedoreResult};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Held while a build for one cache key is in flight. Dropping releases the
/// lock; a process that dies without dropping leaves a stale file, which the
/// age check below reclaims.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
}

/// Locks older than this are treated as leftovers from a dead process.
const STALE_AFTER: Duration = Duration::from_secs(30 * 60);

impl BuildLock {
    /// Acquire the lock for `key`, waiting up to `timeout` for a concurrent
    /// holder to finish.
    pub async fn acquire(locks_dir: &Path, key: &str, timeout: Duration) -> StevedoreResult<Self> {
        std::fs::create_dir_all(locks_dir).map_err(|e| {
            StevedoreError::io(format!("create lock dir {}", locks_dir.display()), e)
        })?;

        let path = locks_dir.join(format!("{}.lock", key));
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    debug!(key, "build lock acquired");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::reclaim_if_stale(&path) {
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(StevedoreError::BuildLockTimeout(key.to_string()));
                    }
                    debug!(key, "waiting on concurrent build");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => {
                    return Err(StevedoreError::io(
                        format!("create lock {}", path.display()),
                        e,
                    ))
                }
            }
        }
    }

    fn reclaim_if_stale(path: &Path) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            // Holder released between our open and stat; retry immediately
            return true;
        };
        let stale = meta
            .modified()
            .ok()
            .and_then(|m| m.elapsed().ok())
            .map(|age| age > STALE_AFTER)
            .unwrap_or(false);
        if stale {
            debug!(path = %path.display(), "reclaiming stale build lock");
            let _ = std::fs::remove_file(path);
        }
        stale
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "failed to remove build lock");
        }
    }
}
