//! File operations for safe JSON persistence.
//!
//! The inventory is rewritten in place under a backup:
//! 1. Copy the current file to a uniquely named backup next to it
//! 2. Truncate and write the new content, then fsync
//! 3. Delete the backup on success
//! 4. On failure, rename the backup back over the target
//!
//! A crash between 1 and 3 leaves the backup on disk; see
//! [`list_backups`] for how a reader finds it again.

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use serde::de::DeserializeOwned;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Read and parse a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    // Bytes, so that invalid UTF-8 is a parse error rather than an I/O error.
    let contents = fs::read(path).map_err(|e| CatalogError::Io {
        message: format!("Failed to read {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;

    serde_json::from_slice(&contents).map_err(|e| CatalogError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })
}

/// Create or truncate `path` and fill it through `write`, then fsync.
pub fn write_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| CatalogError::Io {
            message: format!("Failed to open {} for writing", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })?;

    let mut writer = BufWriter::new(file);
    write(&mut writer)?;

    writer.flush().map_err(|e| CatalogError::io_with_path(e, path))?;
    let file = writer
        .into_inner()
        .map_err(|e| CatalogError::io_with_path(e.into_error(), path))?;

    // fsync to ensure data reaches disk
    file.sync_all().map_err(|e| CatalogError::Io {
        message: format!("Failed to sync {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;

    Ok(())
}

/// Unique backup location for `target`, in the same directory.
pub fn backup_path(target: &Path, prefix: &str) -> PathBuf {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!(
        "{}{}.{}",
        prefix,
        uuid::Uuid::new_v4().simple(),
        CatalogConfig::BACKUP_EXTENSION
    ))
}

/// Overwrite `target` through `write`, keeping a backup until the write succeeded.
///
/// The original write error is always returned, whether or not the backup
/// could be put back. If the restore fails too, the backup stays on disk and
/// its location is logged.
pub fn replace_with_backup<F>(target: &Path, prefix: &str, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let backup = if target.exists() {
        let backup = backup_path(target, prefix);
        fs::copy(target, &backup).map_err(|e| CatalogError::Io {
            message: format!("Failed to back up {}", target.display()),
            path: Some(backup.clone()),
            source: Some(e),
        })?;
        debug!("Created backup: {}", backup.display());
        Some(backup)
    } else {
        None
    };

    match write_file(target, write) {
        Ok(()) => {
            if let Some(backup) = backup {
                if let Err(e) = fs::remove_file(&backup) {
                    warn!("Failed to delete backup {}: {}", backup.display(), e);
                }
            }
            debug!("Wrote {}", target.display());
            Ok(())
        }
        Err(err) => {
            match backup {
                Some(backup) => match fs::rename(&backup, target) {
                    Ok(()) => debug!("Restored {} from backup", target.display()),
                    Err(e) => warn!(
                        "Failed to restore {} ({}); a backup has been saved at {}",
                        target.display(),
                        e,
                        backup.display()
                    ),
                },
                None => {
                    // Nothing existed before, so "old content" means no file.
                    let _ = fs::remove_file(target);
                }
            }
            Err(err)
        }
    }
}

/// Backups left next to `target` by [`replace_with_backup`], newest first.
pub fn list_backups(target: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let entries = fs::read_dir(dir).map_err(|e| CatalogError::Io {
        message: format!("Failed to list {}", dir.display()),
        path: Some(dir.to_path_buf()),
        source: Some(e),
    })?;

    let mut backups: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_backup_name(p, prefix))
        .map(|p| {
            let modified = fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        })
        .collect();

    backups.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(backups.into_iter().map(|(_, p)| p).collect())
}

fn is_backup_name(path: &Path, prefix: &str) -> bool {
    let name_matches = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(prefix));
    let ext_matches = path
        .extension()
        .is_some_and(|e| e == CatalogConfig::BACKUP_EXTENSION);
    name_matches && ext_matches
}
