//! Identifier index of the catalog, persisted as the catalog file.

use super::atomic::{list_backups, read_json, replace_with_backup};
use super::CatalogEntry;
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::record::Configuration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Serialized form of the inventory.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InventoryDocument {
    format: String,
    version: u32,
    counter: u64,
    #[serde(default)]
    entries: Vec<EntryDocument>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryDocument {
    /// File name relative to the catalog directory.
    file: String,
    identifier: String,
    last_modified: DateTime<Utc>,
}

/// Identifier -> entry map plus the identifier counter.
///
/// The counter only ever grows. It is persisted with the entries, so
/// identifiers stay unique across restarts.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    entries: BTreeMap<String, CatalogEntry>,
    counter: u64,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers in the inventory.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> + '_ {
        self.entries.values()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut CatalogEntry> + '_ {
        self.entries.values_mut()
    }

    pub fn get(&self, identifier: &str) -> Option<&CatalogEntry> {
        self.entries.get(identifier)
    }

    pub fn get_mut(&mut self, identifier: &str) -> Option<&mut CatalogEntry> {
        self.entries.get_mut(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an entry under its identifier, returning the entry it replaced.
    pub fn add(&mut self, entry: CatalogEntry) -> Option<CatalogEntry> {
        self.entries.insert(entry.identifier().to_string(), entry)
    }

    /// Remove an entry and delete its record file.
    pub fn remove(&mut self, identifier: &str) -> Option<CatalogEntry> {
        let entry = self.entries.remove(identifier)?;
        if let Err(e) = entry.delete_file() {
            warn!("Failed to delete {}: {}", entry.path().display(), e);
        }
        Some(entry)
    }

    /// Current value of the identifier counter.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Allocate a new identifier.
    pub fn next_identifier(&mut self) -> String {
        self.counter += 1;
        format!("{}_{}", CatalogConfig::IDENTIFIER_NAMESPACE, self.counter)
    }

    /// Raise the counter past a generated identifier found on disk.
    ///
    /// Keys outside the identifier namespace are ignored.
    pub fn observe_identifier(&mut self, key: &str) {
        let observed = key
            .strip_prefix(CatalogConfig::IDENTIFIER_NAMESPACE)
            .and_then(|rest| rest.strip_prefix('_'))
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(n) = observed {
            if n > self.counter {
                debug!("Raising identifier counter from {} to {}", self.counter, n);
                self.counter = n;
            }
        }
    }

    /// Record files referenced by the inventory.
    pub fn record_paths(&self) -> HashSet<PathBuf> {
        self.entries.values().map(|e| e.path().to_path_buf()).collect()
    }

    /// Remove entries whose record key differs from the indexed identifier.
    ///
    /// Returns the decoded records so they can be re-added under a fresh
    /// identifier. Record files are left alone.
    pub fn remove_mismatching(&mut self) -> Vec<(Configuration, PathBuf)> {
        let mismatching: Vec<String> = self
            .entries
            .values_mut()
            .filter_map(|e| e.is_mismatching().then(|| e.identifier().to_string()))
            .collect();

        mismatching
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .filter_map(|mut entry| {
                let path = entry.path().to_path_buf();
                entry.record().cloned().map(|record| (record, path))
            })
            .collect()
    }

    /// Remove entries whose record cannot be read.
    ///
    /// Returns the record files of the removed entries, for deletion.
    pub fn remove_unreadable(&mut self) -> Vec<PathBuf> {
        let unreadable: Vec<String> = self
            .entries
            .values_mut()
            .filter_map(|e| e.record().is_none().then(|| e.identifier().to_string()))
            .collect();

        unreadable
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .map(|entry| entry.path().to_path_buf())
            .collect()
    }

    /// Read an inventory previously written with [`write`](Self::write).
    pub fn read(catalog: &Path) -> Result<Self> {
        let document: InventoryDocument = read_json(catalog)?;

        if document.format != CatalogConfig::INVENTORY_FORMAT {
            return Err(CatalogError::FormatMismatch {
                path: catalog.to_path_buf(),
                expected: CatalogConfig::INVENTORY_FORMAT,
                found: document.format,
            });
        }
        if document.version > CatalogConfig::INVENTORY_VERSION {
            return Err(CatalogError::UnsupportedVersion {
                path: catalog.to_path_buf(),
                format: CatalogConfig::INVENTORY_FORMAT,
                found: document.version,
                supported: CatalogConfig::INVENTORY_VERSION,
            });
        }

        let dir = catalog.parent().unwrap_or_else(|| Path::new("."));
        let mut inventory = Inventory {
            entries: BTreeMap::new(),
            counter: document.counter,
        };

        for entry in document.entries {
            // Only bare file names are accepted; entries never point outside the directory.
            let Some(name) = Path::new(&entry.file).file_name() else {
                warn!("Ignoring catalog entry {} without a file name", entry.identifier);
                continue;
            };
            let replaced = inventory.add(CatalogEntry::new(
                dir.join(name),
                entry.identifier,
                entry.last_modified,
            ));
            if let Some(replaced) = replaced {
                warn!(
                    "Duplicate catalog entry {}, keeping the last one",
                    replaced.identifier()
                );
            }
        }

        debug!(
            "Read {} entries from {} (counter {})",
            inventory.len(),
            catalog.display(),
            inventory.counter
        );
        Ok(inventory)
    }

    /// Write the inventory to `catalog`, protected by a backup named with `prefix`.
    pub fn write(&self, prefix: &str, catalog: &Path) -> Result<()> {
        let document = InventoryDocument {
            format: CatalogConfig::INVENTORY_FORMAT.to_string(),
            version: CatalogConfig::INVENTORY_VERSION,
            counter: self.counter,
            entries: self
                .entries
                .values()
                .filter_map(|e| {
                    let file = e.path().file_name()?.to_string_lossy().to_string();
                    Some(EntryDocument {
                        file,
                        identifier: e.identifier().to_string(),
                        last_modified: e.last_modified(),
                    })
                })
                .collect(),
        };

        replace_with_backup(catalog, prefix, |w| {
            serde_json::to_writer_pretty(w, &document)?;
            Ok(())
        })
    }

    /// Recover the catalog from the newest readable backup next to it.
    ///
    /// The backup is renamed over `catalog`. Returns `None` if no backup
    /// could be read.
    pub fn restore_backup(catalog: &Path, prefix: &str) -> Result<Option<Self>> {
        for backup in list_backups(catalog, prefix)? {
            match Self::read(&backup) {
                Ok(inventory) => {
                    fs::rename(&backup, catalog).map_err(|e| CatalogError::Io {
                        message: format!("Failed to restore backup {}", backup.display()),
                        path: Some(catalog.to_path_buf()),
                        source: Some(e),
                    })?;
                    info!(
                        "Restored {} from backup {}",
                        catalog.display(),
                        backup.display()
                    );
                    return Ok(Some(inventory));
                }
                Err(e) => debug!("Skipping unusable backup {}: {}", backup.display(), e),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ConfigurationDetails, RecordEncoding};
    use tempfile::TempDir;

    fn add_record(inventory: &mut Inventory, dir: &Path, name: &str) -> String {
        let id = inventory.next_identifier();
        let record = Configuration::builder(ConfigurationDetails::builder(&id).build())
            .property("name", name)
            .build();
        let entry =
            CatalogEntry::create(record, &dir.join(format!("config-{}", name)), RecordEncoding::Snapshot)
                .unwrap();
        inventory.add(entry);
        id
    }

    #[test]
    fn test_counter_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");

        let mut inventory = Inventory::new();
        inventory.next_identifier();
        inventory.next_identifier();
        inventory.next_identifier();
        inventory.write("test", &path).unwrap();

        let read = Inventory::read(&path).unwrap();
        assert_eq!(read.counter(), inventory.counter());
        assert_eq!(read.counter(), 3);
    }

    #[test]
    fn test_identifiers_are_namespaced_and_increasing() {
        let mut inventory = Inventory::new();
        let a = inventory.next_identifier();
        let b = inventory.next_identifier();
        assert_eq!(a, "confstore.user_1");
        assert_eq!(b, "confstore.user_2");
    }

    #[test]
    fn test_observe_identifier() {
        let mut inventory = Inventory::new();
        inventory.observe_identifier("confstore.user_41");
        assert_eq!(inventory.next_identifier(), "confstore.user_42");

        // Lower, foreign and malformed keys leave the counter alone.
        inventory.observe_identifier("confstore.user_3");
        inventory.observe_identifier("external-key_99");
        inventory.observe_identifier("confstore.user_x");
        assert_eq!(inventory.counter(), 42);
    }

    #[test]
    fn test_entries_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");
        let mut inventory = Inventory::new();
        let a = add_record(&mut inventory, temp_dir.path(), "a");
        let b = add_record(&mut inventory, temp_dir.path(), "b");
        inventory.write("catalog-", &path).unwrap();

        let mut read = Inventory::read(&path).unwrap();
        let keys: Vec<&str> = read.keys().collect();
        assert_eq!(keys, vec![a.as_str(), b.as_str()]);
        assert_eq!(read.record_paths(), inventory.record_paths());

        let entry = read.get_mut(&a).unwrap();
        assert_eq!(entry.record().unwrap().properties()["name"], "a");
    }

    #[test]
    fn test_remove_deletes_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut inventory = Inventory::new();
        let id = add_record(&mut inventory, temp_dir.path(), "a");
        let path = inventory.get(&id).unwrap().path().to_path_buf();
        assert!(path.exists());

        let removed = inventory.remove(&id).unwrap();
        assert_eq!(removed.identifier(), id);
        assert!(!path.exists());
        assert!(inventory.remove(&id).is_none());
        assert!(!inventory.contains(&id));
    }

    #[test]
    fn test_remove_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        let mut inventory = Inventory::new();
        let good = add_record(&mut inventory, temp_dir.path(), "good");
        let bad = add_record(&mut inventory, temp_dir.path(), "bad");
        let bad_path = inventory.get(&bad).unwrap().path().to_path_buf();
        fs::write(&bad_path, "garbage").unwrap();

        let removed = inventory.remove_unreadable();
        assert_eq!(removed, vec![bad_path.clone()]);
        assert!(inventory.contains(&good));
        assert!(!inventory.contains(&bad));
        // Files are the caller's to delete.
        assert!(bad_path.exists());
        assert!(inventory.remove_unreadable().is_empty());
    }

    #[test]
    fn test_remove_mismatching() {
        let temp_dir = TempDir::new().unwrap();
        let mut inventory = Inventory::new();
        let good = add_record(&mut inventory, temp_dir.path(), "good");
        let edited = add_record(&mut inventory, temp_dir.path(), "edited");
        let edited_path = inventory.get(&edited).unwrap().path().to_path_buf();

        Configuration::builder(ConfigurationDetails::builder("hand-edited").build())
            .property("name", "edited")
            .build()
            .write(&edited_path)
            .unwrap();

        let removed = inventory.remove_mismatching();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0.key(), "hand-edited");
        assert_eq!(removed[0].0.properties()["name"], "edited");
        assert_eq!(removed[0].1, edited_path);
        assert!(inventory.contains(&good));
        assert!(!inventory.contains(&edited));
    }

    #[test]
    fn test_read_rejects_foreign_documents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");

        fs::write(&path, r#"{"format":"something-else","version":1,"counter":0}"#).unwrap();
        assert!(Inventory::read(&path).unwrap_err().is_decode_error());

        fs::write(&path, r#"{"format":"confstore-inventory","version":7,"counter":0}"#).unwrap();
        assert!(matches!(
            Inventory::read(&path).unwrap_err(),
            CatalogError::UnsupportedVersion { found: 7, .. }
        ));
    }

    #[test]
    fn test_read_confines_entries_to_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");
        fs::write(
            &path,
            r#"{"format":"confstore-inventory","version":1,"counter":2,"entries":[
                {"file":"../../etc/passwd","identifier":"a","lastModified":"2024-01-01T00:00:00Z"},
                {"file":"..","identifier":"b","lastModified":"2024-01-01T00:00:00Z"}
            ]}"#,
        )
        .unwrap();

        let inventory = Inventory::read(&path).unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(
            inventory.get("a").unwrap().path(),
            temp_dir.path().join("passwd")
        );
    }

    #[test]
    fn test_restore_backup() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");
        let mut inventory = Inventory::new();
        add_record(&mut inventory, temp_dir.path(), "a");
        inventory.write("catalog-", &path).unwrap();

        // Simulate a crash mid-write: backup present, catalog truncated.
        let backup = temp_dir.path().join("catalog-crashed.bak");
        fs::copy(&path, &backup).unwrap();
        fs::write(&path, "{\"format\": \"confstore-inv").unwrap();
        assert!(Inventory::read(&path).is_err());

        let restored = Inventory::restore_backup(&path, "catalog-").unwrap().unwrap();
        assert_eq!(restored.counter(), 1);
        assert_eq!(restored.len(), 1);
        assert!(!backup.exists());
        assert_eq!(Inventory::read(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_restore_backup_without_backups() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");
        fs::write(&path, "broken").unwrap();
        fs::write(temp_dir.path().join("catalog-x.bak"), "also broken").unwrap();

        assert!(Inventory::restore_backup(&path, "catalog-").unwrap().is_none());
    }
}
