//! Advisory File Locks
//!
//! Cross-process mutual exclusion for the shared state files (rate-limit log,
//! batch queue). Acquisition retries a bounded number of times and never
//! blocks indefinitely; the lock is released when the guard is dropped.
//!
//! Retries sleep the calling thread, so an async caller holds its worker for
//! at most `attempts * backoff` (one second with the defaults).

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;

/// Default number of acquisition attempts.
pub const DEFAULT_RETRIES: u32 = 20;

/// Default pause between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

/// Lock acquisition errors
#[derive(Error, Debug)]
pub enum LockError {
    #[error("lock {path} is held by another process")]
    Contended { path: PathBuf },

    #[error("lock I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Guard for an exclusive advisory lock on a lock file.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock with the default retry budget.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        Self::acquire_with(path, DEFAULT_RETRIES, DEFAULT_BACKOFF)
    }

    /// Acquire the lock, trying `attempts` times with `backoff` in between.
    pub fn acquire_with(path: &Path, attempts: u32, backoff: Duration) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    tracing::debug!(
                        "Lock {} contended (attempt {}/{})",
                        path.display(),
                        attempt,
                        attempts
                    );
                    if attempt < attempts {
                        std::thread::sleep(backoff);
                    }
                }
                Err(e) => return Err(LockError::Io(e)),
            }
        }

        Err(LockError::Contended {
            path: path.to_path_buf(),
        })
    }

    /// Path of the underlying lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
