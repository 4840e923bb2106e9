//! Centralized configuration for the catalog.
//!
//! File layout, format identifiers and lock retry defaults live here so the
//! on-disk contract can be read in one place.

use std::time::Duration;

/// On-disk layout and format constants.
pub struct CatalogConfig;

impl CatalogConfig {
    /// Inventory file, one per catalog directory.
    pub const CATALOG_FILE_NAME: &'static str = "catalog.json";
    /// Lock file negotiated between processes.
    pub const LOCK_FILE_NAME: &'static str = ".catalog.lock";
    /// Prefix of per-record files.
    pub const RECORD_FILE_PREFIX: &'static str = "config-";
    /// Prefix of backups taken while the inventory is rewritten.
    pub const BACKUP_FILE_PREFIX: &'static str = "catalog-";
    pub const BACKUP_EXTENSION: &'static str = "bak";
    pub const CORRUPT_EXTENSION: &'static str = "corrupt";

    /// Namespace of generated identifiers, `{namespace}_{counter}`.
    pub const IDENTIFIER_NAMESPACE: &'static str = "confstore.user";

    // Document formats
    pub const INVENTORY_FORMAT: &'static str = "confstore-inventory";
    pub const INVENTORY_VERSION: u32 = 1;
    pub const RECORD_FORMAT: &'static str = "confstore-configuration";
    pub const RECORD_VERSION: u32 = 1;
    pub const XML_NAMESPACE: &'static str = "http://confstore.dev/ns/config";

    /// A catalog file modified less than this long before it was observed may
    /// be rewritten again without a visible change of its stamp, so such an
    /// observation is not trusted for skipping a reload.
    pub const RACY_WINDOW: Duration = Duration::from_secs(2);
}

/// Lock acquisition defaults.
pub struct LockConfig;

impl LockConfig {
    pub const MAX_ATTEMPTS: u32 = 20;
    pub const MIN_BACKOFF: Duration = Duration::from_millis(50);
    pub const MAX_BACKOFF: Duration = Duration::from_millis(150);
}

/// Retry policy for acquiring the catalog lock.
#[derive(Debug, Clone)]
pub struct LockRetryConfig {
    /// Maximum number of acquisition attempts (including the first one).
    pub max_attempts: u32,
    /// Lower bound of the randomized pause between attempts.
    pub min_backoff: Duration,
    /// Upper bound (exclusive) of the randomized pause between attempts.
    pub max_backoff: Duration,
}

impl Default for LockRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: LockConfig::MAX_ATTEMPTS,
            min_backoff: LockConfig::MIN_BACKOFF,
            max_backoff: LockConfig::MAX_BACKOFF,
        }
    }
}

impl LockRetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the backoff range.
    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.min_backoff = min;
        self.max_backoff = max.max(min);
        self
    }

    /// Worst-case time spent sleeping before giving up.
    pub fn worst_case_wait(&self) -> Duration {
        self.max_backoff * self.max_attempts.saturating_sub(1)
    }
}
