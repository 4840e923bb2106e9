//! On-disk index of the catalog.
//!
//! This module provides:
//! - Backup-protected rewrites of the catalog file
//! - Index entries with a lazily decoded record
//! - The inventory: identifier map, identifier counter and consistency scans

pub mod atomic;
mod entry;
mod inventory;

pub use entry::{CachedRecord, CatalogEntry};
pub use inventory::Inventory;

use crate::config::CatalogConfig;
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Observable identity of a file's content: modification time plus length.
///
/// File systems commonly record modification times at a granularity of a few
/// milliseconds, so the length is compared as well to catch quick rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    /// Stamp of the file at `path`, or `None` if it does not exist.
    pub fn of(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok()?;
        Some(Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Returns true if a rewrite after `observed_at` must change this stamp.
    ///
    /// A file modified within [`CatalogConfig::RACY_WINDOW`] before it was
    /// observed can be rewritten in the same timestamp tick with the same
    /// length, so such an observation proves nothing.
    pub fn is_settled(&self, observed_at: SystemTime) -> bool {
        self.modified.is_some_and(|modified| {
            observed_at
                .duration_since(modified)
                .is_ok_and(|age| age >= CatalogConfig::RACY_WINDOW)
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
