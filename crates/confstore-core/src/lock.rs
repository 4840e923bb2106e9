//! Cross-process exclusive access.
//!
//! Whoever holds the advisory lock on the catalog's lock file has exclusive
//! access to the catalog directory until the lock is released, or until the
//! holding process exits. The agreement only binds processes that go through
//! this module; the operating system enforces nothing on the other files.

use crate::config::LockRetryConfig;
use crate::error::{CatalogError, Result};
use fs2::FileExt;
use rand::Rng;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Inter-process exclusive access signaling.
///
/// Only one caller may hold access at any given time, even across processes.
/// Access is retained until it is explicitly released or the owner exits.
pub trait ExclusiveAccess: Send {
    /// Try to acquire exclusive access without blocking.
    ///
    /// Returns `Ok(false)` if someone else currently holds it, and an error if
    /// access could not be acquired for any other reason.
    fn acquire(&mut self) -> Result<bool>;

    /// Release previously acquired access. Safe to call when not held.
    fn release(&mut self);

    /// Location used for diagnostics.
    fn path(&self) -> &Path;
}

/// Advisory file lock backed by a single well-known file.
///
/// The file is created on first use and left in place afterwards; deleting it
/// while another process has it open would let two holders coexist.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    held: Option<File>,
}

impl FileLock {
    /// Create a lock on the given file. Nothing is touched until [`acquire`].
    ///
    /// [`acquire`]: ExclusiveAccess::acquire
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            held: None,
        }
    }

    /// Returns true while this handle holds the lock.
    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    fn lock_failed(&self, message: &str, err: std::io::Error) -> CatalogError {
        CatalogError::LockFailed {
            path: self.path.clone(),
            message: format!("{}: {}", message, err),
            source: Some(err),
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl ExclusiveAccess for FileLock {
    fn acquire(&mut self) -> Result<bool> {
        if self.held.is_some() {
            return Ok(true);
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.lock_failed("failed to open lock file", e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired lock {}", self.path.display());
                self.held = Some(file);
                Ok(true)
            }
            Err(e) if is_contended(&e) => {
                debug!("Lock {} is held elsewhere", self.path.display());
                Ok(false)
            }
            Err(e) => Err(self.lock_failed("failed to lock", e)),
        }
    }

    fn release(&mut self) {
        if let Some(file) = self.held.take() {
            if let Err(e) = FileExt::unlock(&file) {
                // Closing the handle below releases the lock regardless.
                warn!("Failed to unlock {}: {}", self.path.display(), e);
            } else {
                debug!("Released lock {}", self.path.display());
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Acquire `lock`, retrying with a randomized pause between attempts.
///
/// Blocks the calling thread for at most
/// [`LockRetryConfig::worst_case_wait`]. There is no cancellation.
pub fn acquire_with_retry(lock: &mut dyn ExclusiveAccess, config: &LockRetryConfig) -> Result<()> {
    let attempts = config.max_attempts.max(1);
    for attempt in 1..=attempts {
        if lock.acquire()? {
            return Ok(());
        }
        if attempt < attempts {
            let delay = backoff(config);
            debug!(
                "Lock {} busy (attempt {}/{}), retrying in {:?}",
                lock.path().display(),
                attempt,
                attempts,
                delay
            );
            thread::sleep(delay);
        }
    }

    Err(CatalogError::LockUnavailable {
        path: lock.path().to_path_buf(),
        attempts,
    })
}

fn backoff(config: &LockRetryConfig) -> Duration {
    let min = config.min_backoff.as_millis() as u64;
    let max = config.max_backoff.as_millis() as u64;
    if max <= min {
        return config.min_backoff;
    }
    Duration::from_millis(rand::rng().random_range(min..max))
}
