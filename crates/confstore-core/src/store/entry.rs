//! Index entry for a single record file.

use super::FileStamp;
use crate::error::{CatalogError, Result};
use crate::record::{Configuration, RecordEncoding};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Decoded-record cache of an entry.
///
/// Each loaded state remembers the record file's stamp and when it was taken.
/// A different (or missing) stamp on the next access invalidates it, so a file
/// that is replaced or damaged after it was cached is noticed on the next read
/// rather than at the next reconciliation. A stamp taken right after the file
/// was modified is never trusted, see [`FileStamp::is_settled`].
#[derive(Debug, Clone, Default)]
pub enum CachedRecord {
    /// The file has not been read yet.
    #[default]
    Unloaded,
    /// The file decoded successfully.
    Loaded {
        record: Configuration,
        stamp: Option<FileStamp>,
        observed_at: SystemTime,
    },
    /// The file was read and could not be decoded (or is gone).
    Unreadable {
        stamp: Option<FileStamp>,
        observed_at: SystemTime,
    },
}

impl CachedRecord {
    fn is_current(&self, current: Option<FileStamp>) -> bool {
        match self {
            CachedRecord::Unloaded => false,
            CachedRecord::Loaded {
                stamp, observed_at, ..
            }
            | CachedRecord::Unreadable { stamp, observed_at } => {
                *stamp == current && stamp.map_or(true, |s| s.is_settled(*observed_at))
            }
        }
    }
}

/// Binds a record file to its identifier.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    path: PathBuf,
    identifier: String,
    last_modified: DateTime<Utc>,
    cache: CachedRecord,
}

impl CatalogEntry {
    /// Entry for an existing file; the record is read on first access.
    pub fn new(
        path: impl Into<PathBuf>,
        identifier: impl Into<String>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            path: path.into(),
            identifier: identifier.into(),
            last_modified,
            cache: CachedRecord::Unloaded,
        }
    }

    /// Write `record` to `path` and create an entry for it.
    ///
    /// The entry's identifier is the record's key. Records that cannot be
    /// represented in the requested encoding are written as snapshots, so the
    /// caller must use the returned entry's path rather than `path`.
    pub fn create(record: Configuration, path: &Path, encoding: RecordEncoding) -> Result<Self> {
        let encoding = encoding.for_configuration(&record);
        let path = path.with_extension(encoding.extension());
        record.write_as(encoding, &path)?;

        let stamp = FileStamp::of(&path);
        let observed_at = SystemTime::now();
        let last_modified = stamp
            .and_then(|s| s.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(Utc::now);
        debug!("Created entry {} at {}", record.key(), path.display());

        Ok(Self {
            path,
            identifier: record.key().to_string(),
            last_modified,
            cache: CachedRecord::Loaded {
                record,
                stamp,
                observed_at,
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Modification time of the record file when the entry was written.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn cache(&self) -> &CachedRecord {
        &self.cache
    }

    /// The decoded record, reading the file if the cache is not current.
    ///
    /// Returns `None` if the file cannot be read or decoded.
    pub fn record(&mut self) -> Option<&Configuration> {
        let stamp = FileStamp::of(&self.path);
        if !self.cache.is_current(stamp) {
            let observed_at = SystemTime::now();
            self.cache = match Configuration::read_any(&self.path) {
                Ok(record) => CachedRecord::Loaded {
                    record,
                    stamp,
                    observed_at,
                },
                Err(e) => {
                    debug!("Entry {} is unreadable: {}", self.identifier, e);
                    CachedRecord::Unreadable { stamp, observed_at }
                }
            };
        }

        match &self.cache {
            CachedRecord::Loaded { record, .. } => Some(record),
            _ => None,
        }
    }

    /// Returns true if the record's key differs from the indexed identifier.
    ///
    /// Unreadable entries are not mismatching.
    pub fn is_mismatching(&mut self) -> bool {
        let identifier = self.identifier.clone();
        self.record().is_some_and(|r| r.key() != identifier)
    }

    /// Delete the record file.
    pub fn delete_file(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CatalogError::io_with_path(e, &self.path)),
        }
    }
}
