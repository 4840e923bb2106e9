//! User configurations stored in a shared directory.
//!
//! Every operation runs as one critical section: the in-process mutex is taken
//! first, then the cross-process file lock. Inside it the inventory is
//! reloaded if another process changed the catalog file, the mutation (if any)
//! is applied, and the inventory is written back.

use crate::config::{CatalogConfig, LockRetryConfig};
use crate::error::{CatalogError, Result};
use crate::lock::{acquire_with_retry, ExclusiveAccess, FileLock};
use crate::record::{Configuration, ConfigurationDetails, Properties, RecordEncoding};
use crate::store::atomic::list_backups;
use crate::store::{CatalogEntry, FileStamp, Inventory};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Changes made by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Entries dropped because their record could not be read.
    pub removed_unreadable: usize,
    /// Entries re-issued because their record key differed from the identifier.
    pub recreated_mismatching: usize,
    /// Record files found in the directory but not in the inventory.
    pub imported: usize,
    /// Leftover backups of the catalog file.
    pub discarded_backups: usize,
}

impl ReconcileReport {
    /// Returns true if the pass changed nothing.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }

    fn changes_inventory(&self) -> bool {
        self.removed_unreadable + self.recreated_mismatching + self.imported > 0
    }
}

/// Last observed state of the catalog file.
#[derive(Debug, Clone, Copy)]
struct Watermark {
    stamp: Option<FileStamp>,
    observed_at: SystemTime,
}

impl Watermark {
    fn observe(path: &Path) -> Self {
        Self {
            stamp: FileStamp::of(path),
            observed_at: SystemTime::now(),
        }
    }

    /// Returns true if a file with stamp `current` needs no reload.
    fn is_current(&self, current: Option<FileStamp>) -> bool {
        current == self.stamp && !self.is_racy()
    }

    fn is_racy(&self) -> bool {
        self.stamp.is_some_and(|s| !s.is_settled(self.observed_at))
    }
}

struct CatalogState {
    lock: Box<dyn ExclusiveAccess>,
    inventory: Inventory,
    watermark: Option<Watermark>,
}

struct Storage {
    directory: PathBuf,
    catalog_file: PathBuf,
    lock_retry: LockRetryConfig,
    encoding: RecordEncoding,
    state: Mutex<CatalogState>,
}

/// Builder for [`UserConfigurations`].
///
/// # Example
///
/// ```rust,ignore
/// use confstore_core::{RecordEncoding, UserConfigurations};
///
/// let configurations = UserConfigurations::builder()
///     .directory("./configurations")
///     .record_encoding(RecordEncoding::Xml)
///     .build();
/// ```
#[derive(Default)]
pub struct UserConfigurationsBuilder {
    directory: Option<PathBuf>,
    lock: Option<Box<dyn ExclusiveAccess>>,
    lock_retry: LockRetryConfig,
    encoding: RecordEncoding,
}

impl UserConfigurationsBuilder {
    /// Directory holding the catalog. Without one the catalog is unavailable.
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Cross-process lock to use instead of `<directory>/.catalog.lock`.
    pub fn lock(mut self, lock: impl ExclusiveAccess + 'static) -> Self {
        self.lock = Some(Box::new(lock));
        self
    }

    /// Retry policy for acquiring the lock.
    ///
    /// Default: 20 attempts, 50-150 ms apart
    pub fn lock_retry(mut self, config: LockRetryConfig) -> Self {
        self.lock_retry = config;
        self
    }

    /// File format of newly written records.
    ///
    /// Records that cannot be represented as XML are always written as
    /// snapshots.
    ///
    /// Default: [`RecordEncoding::Snapshot`]
    pub fn record_encoding(mut self, encoding: RecordEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Open the catalog and reconcile it with the directory contents.
    ///
    /// The directory is created if needed. If that fails the catalog is
    /// returned in its unavailable state; reconciliation failures are logged.
    pub fn build(self) -> UserConfigurations {
        let Some(directory) = self.directory else {
            debug!("No catalog directory configured");
            return UserConfigurations::unavailable();
        };

        if let Err(e) = fs::create_dir_all(&directory) {
            warn!(
                "Catalog directory {} is unavailable: {}",
                directory.display(),
                e
            );
            return UserConfigurations::unavailable();
        }

        let lock = self.lock.unwrap_or_else(|| {
            Box::new(FileLock::new(directory.join(CatalogConfig::LOCK_FILE_NAME)))
        });
        let configurations = UserConfigurations {
            storage: Some(Storage {
                catalog_file: directory.join(CatalogConfig::CATALOG_FILE_NAME),
                directory,
                lock_retry: self.lock_retry,
                encoding: self.encoding,
                state: Mutex::new(CatalogState {
                    lock,
                    inventory: Inventory::new(),
                    watermark: None,
                }),
            }),
        };

        if let Err(e) = configurations.reconcile() {
            warn!("Initial reconciliation failed: {}", e);
        }
        configurations
    }
}

/// Configurations created by users, shared by every process using the same
/// directory.
pub struct UserConfigurations {
    storage: Option<Storage>,
}

impl fmt::Debug for UserConfigurations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConfigurations")
            .field("directory", &self.directory())
            .finish()
    }
}

impl UserConfigurations {
    pub fn builder() -> UserConfigurationsBuilder {
        UserConfigurationsBuilder::default()
    }

    /// Open the catalog in `directory` with default settings.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::builder().directory(directory).build()
    }

    /// A catalog without storage: reads are empty and mutations fail.
    pub fn unavailable() -> Self {
        Self { storage: None }
    }

    pub fn directory(&self) -> Option<&Path> {
        self.storage.as_ref().map(|s| s.directory.as_path())
    }

    pub fn is_available(&self) -> bool {
        self.storage.is_some()
    }

    // ========================================
    // Reads
    // ========================================

    /// Details of every readable configuration.
    pub fn configuration_details(&self) -> HashSet<ConfigurationDetails> {
        let Some(storage) = &self.storage else {
            return HashSet::new();
        };
        let Some(mut state) = storage.refreshed_state() else {
            return HashSet::new();
        };

        state
            .inventory
            .entries_mut()
            .filter_map(|entry| entry.record().map(|r| r.details().clone()))
            .collect()
    }

    /// Properties of a configuration, or `None` if it is unknown or unreadable.
    pub fn configuration(&self, identifier: &str) -> Option<Properties> {
        let storage = self.storage.as_ref()?;
        let mut state = storage.refreshed_state()?;
        let entry = state.inventory.get_mut(identifier)?;
        entry.record().map(|r| r.properties().clone())
    }

    /// Returns true if the identifier is in the inventory as last loaded.
    ///
    /// Does not touch the disk.
    pub fn contains_configuration(&self, identifier: &str) -> bool {
        let Some(storage) = &self.storage else {
            return false;
        };
        storage
            .lock_state()
            .map(|state| state.inventory.contains(identifier))
            .unwrap_or(false)
    }

    // ========================================
    // Mutations
    // ========================================

    /// Store a new configuration and return its identifier.
    ///
    /// Returns `None` if the catalog is unavailable or the write failed.
    pub fn add_configuration(
        &self,
        nice_name: impl Into<String>,
        description: impl Into<String>,
        properties: Properties,
    ) -> Option<String> {
        match self.try_add_configuration(nice_name, description, properties) {
            Ok(identifier) => Some(identifier),
            Err(e) => {
                warn!("Failed to add configuration: {}", e);
                None
            }
        }
    }

    /// Remove a configuration and delete its file.
    ///
    /// Returns false if it is unknown, or if the catalog is unavailable.
    pub fn remove_configuration(&self, identifier: &str) -> bool {
        match self.try_remove_configuration(identifier) {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Failed to remove configuration {}: {}", identifier, e);
                false
            }
        }
    }

    /// Like [`add_configuration`](Self::add_configuration), reporting why it failed.
    pub fn try_add_configuration(
        &self,
        nice_name: impl Into<String>,
        description: impl Into<String>,
        properties: Properties,
    ) -> Result<String> {
        let storage = self.storage()?;
        let path = storage.new_record_path();
        let (nice_name, description) = (nice_name.into(), description.into());

        let result = storage.sync(|storage, inventory| {
            let identifier = inventory.next_identifier();
            let details = ConfigurationDetails::builder(&identifier)
                .nice_name(nice_name)
                .description(description)
                .build();
            let record = Configuration::new(details, properties);
            inventory.add(CatalogEntry::create(record, &path, storage.encoding)?);
            Ok((identifier, true))
        });

        match result {
            Ok(identifier) => {
                debug!("Added configuration {}", identifier);
                Ok(identifier)
            }
            Err(e) => {
                // The inventory on disk does not reference the new file.
                for encoding in [RecordEncoding::Snapshot, RecordEncoding::Xml] {
                    let _ = fs::remove_file(path.with_extension(encoding.extension()));
                }
                Err(e)
            }
        }
    }

    /// Like [`remove_configuration`](Self::remove_configuration), reporting why it failed.
    pub fn try_remove_configuration(&self, identifier: &str) -> Result<bool> {
        let storage = self.storage()?;
        let removed = storage.sync(|_, inventory| {
            let removed = inventory.remove(identifier).is_some();
            Ok((removed, removed))
        })?;
        if removed {
            debug!("Removed configuration {}", identifier);
        }
        Ok(removed)
    }

    /// Align the inventory with the directory contents.
    ///
    /// Drops entries whose record is unreadable, re-issues entries whose record
    /// key differs from their identifier, imports record files missing from the
    /// inventory and deletes leftover catalog backups. Running it again right
    /// away changes nothing.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let storage = self.storage()?;
        let report = storage.sync(|storage, inventory| {
            let report = storage.cleanup_inventory(inventory)?;
            Ok((report, report.changes_inventory()))
        })?;

        if report.is_clean() {
            debug!("Catalog {} is consistent", storage.directory.display());
        } else {
            info!(
                "Reconciled {}: {:?}",
                storage.directory.display(),
                report
            );
        }
        Ok(report)
    }

    fn storage(&self) -> Result<&Storage> {
        self.storage.as_ref().ok_or(CatalogError::DirectoryUnavailable)
    }
}

impl Storage {
    fn lock_state(&self) -> Result<MutexGuard<'_, CatalogState>> {
        self.state
            .lock()
            .map_err(|_| CatalogError::Other("Catalog state lock poisoned".to_string()))
    }

    /// Run `mutation` on the current inventory under both locks.
    ///
    /// The mutation returns its result and whether it changed the inventory;
    /// only a changed inventory is written back. After any failure the next
    /// call reloads the inventory from disk.
    fn sync<T, F>(&self, mutation: F) -> Result<T>
    where
        F: FnOnce(&Storage, &mut Inventory) -> Result<(T, bool)>,
    {
        let mut guard = self.lock_state()?;
        self.sync_state(&mut *guard, mutation)
    }

    /// [`sync`](Self::sync) on state whose mutex the caller already holds.
    fn sync_state<T, F>(&self, state: &mut CatalogState, mutation: F) -> Result<T>
    where
        F: FnOnce(&Storage, &mut Inventory) -> Result<(T, bool)>,
    {
        acquire_with_retry(state.lock.as_mut(), &self.lock_retry)?;
        let result = self.sync_locked(state, mutation);
        state.lock.release();

        if result.is_err() {
            state.watermark = None;
        }
        result
    }

    fn sync_locked<T, F>(&self, state: &mut CatalogState, mutation: F) -> Result<T>
    where
        F: FnOnce(&Storage, &mut Inventory) -> Result<(T, bool)>,
    {
        self.reload_if_stale(state)?;

        let (value, changed) = mutation(self, &mut state.inventory)?;
        if changed {
            state
                .inventory
                .write(CatalogConfig::BACKUP_FILE_PREFIX, &self.catalog_file)?;
            state.watermark = Some(Watermark::observe(&self.catalog_file));
        }
        Ok(value)
    }

    /// State guard with the inventory brought up to date.
    ///
    /// The refresh and the caller's read happen under one hold of the mutex.
    /// If the catalog cannot be synchronized the last loaded inventory is
    /// used; `None` only if the state itself is unusable.
    fn refreshed_state(&self) -> Option<MutexGuard<'_, CatalogState>> {
        let mut state = match self.lock_state() {
            Ok(state) => state,
            Err(e) => {
                warn!("{}", e);
                return None;
            }
        };
        if let Err(e) = self.sync_state(&mut *state, |_, _| Ok(((), false))) {
            warn!(
                "Using last loaded catalog for {}: {}",
                self.directory.display(),
                e
            );
        }
        Some(state)
    }

    fn reload_if_stale(&self, state: &mut CatalogState) -> Result<()> {
        let stamp = FileStamp::of(&self.catalog_file);
        if state.watermark.is_some_and(|w| w.is_current(stamp)) {
            return Ok(());
        }

        state.inventory = match stamp {
            Some(_) => self.load_inventory()?,
            None => Inventory::new(),
        };
        state.watermark = Some(Watermark::observe(&self.catalog_file));
        debug!(
            "Loaded {} entries from {}",
            state.inventory.len(),
            self.catalog_file.display()
        );
        Ok(())
    }

    /// Read the catalog file, recovering from a damaged one.
    ///
    /// A catalog that cannot be decoded is replaced by its newest readable
    /// backup. Without one it is set aside and an empty inventory is used;
    /// reconciliation then imports the record files again.
    fn load_inventory(&self) -> Result<Inventory> {
        let err = match Inventory::read(&self.catalog_file) {
            Ok(inventory) => return Ok(inventory),
            Err(e) if e.is_decode_error() => e,
            Err(e) => return Err(e),
        };
        warn!("Catalog {} is damaged: {}", self.catalog_file.display(), err);

        if let Some(inventory) =
            Inventory::restore_backup(&self.catalog_file, CatalogConfig::BACKUP_FILE_PREFIX)?
        {
            return Ok(inventory);
        }

        let corrupt = self.directory.join(format!(
            "{}{}.{}",
            CatalogConfig::BACKUP_FILE_PREFIX,
            uuid::Uuid::new_v4().simple(),
            CatalogConfig::CORRUPT_EXTENSION
        ));
        fs::rename(&self.catalog_file, &corrupt).map_err(|e| CatalogError::Io {
            message: format!("Failed to set aside {}", self.catalog_file.display()),
            path: Some(corrupt.clone()),
            source: Some(e),
        })?;
        warn!(
            "No usable backup of {}; moved it to {} and starting over",
            self.catalog_file.display(),
            corrupt.display()
        );
        Ok(Inventory::new())
    }

    fn new_record_path(&self) -> PathBuf {
        self.directory.join(format!(
            "{}{}",
            CatalogConfig::RECORD_FILE_PREFIX,
            uuid::Uuid::new_v4().simple()
        ))
    }

    // ========================================
    // Reconciliation
    // ========================================

    fn cleanup_inventory(&self, inventory: &mut Inventory) -> Result<ReconcileReport> {
        Ok(ReconcileReport {
            removed_unreadable: self.remove_unreadable(inventory),
            recreated_mismatching: self.recreate_mismatching(inventory),
            imported: self.import_configurations(inventory)?,
            discarded_backups: self.discard_stale_backups()?,
        })
    }

    fn remove_unreadable(&self, inventory: &mut Inventory) -> usize {
        let paths = inventory.remove_unreadable();
        for path in &paths {
            info!("Removing unreadable configuration {}", path.display());
            remove_file_if_exists(path);
        }
        paths.len()
    }

    fn recreate_mismatching(&self, inventory: &mut Inventory) -> usize {
        let mut recreated = 0;
        for (record, old_path) in inventory.remove_mismatching() {
            inventory.observe_identifier(record.key());
            let identifier = inventory.next_identifier();
            let encoding = RecordEncoding::from_path(&old_path).unwrap_or(self.encoding);

            match CatalogEntry::create(record.with_key(&identifier), &self.new_record_path(), encoding)
            {
                Ok(entry) => {
                    info!(
                        "Re-issued {} (key {}) as {}",
                        old_path.display(),
                        record.key(),
                        identifier
                    );
                    inventory.add(entry);
                    remove_file_if_exists(&old_path);
                    recreated += 1;
                }
                // The old file is no longer indexed and gets imported instead.
                Err(e) => warn!("Failed to re-issue {}: {}", old_path.display(), e),
            }
        }
        recreated
    }

    fn import_configurations(&self, inventory: &mut Inventory) -> Result<usize> {
        let mut imported = 0;
        for path in self.orphan_files(inventory)? {
            let record = match Configuration::read_any(&path) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Not importing {}: {}", path.display(), e);
                    continue;
                }
            };

            inventory.observe_identifier(record.key());
            let identifier = inventory.next_identifier();
            let encoding = RecordEncoding::from_path(&path).unwrap_or(self.encoding);
            let entry =
                CatalogEntry::create(record.with_key(&identifier), &self.new_record_path(), encoding)?;
            inventory.add(entry);
            remove_file_if_exists(&path);
            info!("Imported {} as {}", path.display(), identifier);
            imported += 1;
        }
        Ok(imported)
    }

    /// Record files in the directory that the inventory does not reference.
    fn orphan_files(&self, inventory: &Inventory) -> Result<Vec<PathBuf>> {
        let known = inventory.record_paths();
        let entries = fs::read_dir(&self.directory).map_err(|e| CatalogError::Io {
            message: format!("Failed to list {}", self.directory.display()),
            path: Some(self.directory.clone()),
            source: Some(e),
        })?;

        let mut orphans: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && *p != self.catalog_file
                    && RecordEncoding::from_path(p).is_some()
                    && !known.contains(p)
            })
            .collect();
        orphans.sort();
        Ok(orphans)
    }

    /// Delete backups left by an interrupted write of a catalog that reads fine.
    fn discard_stale_backups(&self) -> Result<usize> {
        if !self.catalog_file.exists() {
            return Ok(0);
        }
        let backups = list_backups(&self.catalog_file, CatalogConfig::BACKUP_FILE_PREFIX)?;
        for backup in &backups {
            info!("Discarding stale backup {}", backup.display());
            remove_file_if_exists(backup);
        }
        Ok(backups.len())
    }
}

fn remove_file_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::atomic::write_file;
    use std::io::Write;
    use tempfile::TempDir;

    fn props(pairs: &[(&str, &str)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<UserConfigurations>();
    }

    #[test]
    fn test_report_is_clean() {
        assert!(ReconcileReport::default().is_clean());
        let report = ReconcileReport {
            discarded_backups: 1,
            ..Default::default()
        };
        assert!(!report.is_clean());
        assert!(!report.changes_inventory());
    }

    #[test]
    fn test_watermark_racy_observation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.json");
        fs::write(&path, "{}").unwrap();

        // Just written: the stamp may not change on the next rewrite.
        let fresh = Watermark::observe(&path);
        assert!(!fresh.is_current(FileStamp::of(&path)));

        let settled = Watermark {
            stamp: FileStamp::of(&path),
            observed_at: SystemTime::now() + CatalogConfig::RACY_WINDOW * 2,
        };
        assert!(settled.is_current(FileStamp::of(&path)));
        assert!(!settled.is_current(None));

        let missing = Watermark::observe(&temp_dir.path().join("none.json"));
        assert!(missing.is_current(None));
    }

    #[test]
    fn test_unwritten_catalog_is_not_created() {
        let temp_dir = TempDir::new().unwrap();
        let configurations = UserConfigurations::new(temp_dir.path());
        assert!(configurations.configuration_details().is_empty());
        assert!(!temp_dir.path().join(CatalogConfig::CATALOG_FILE_NAME).exists());
    }

    #[test]
    fn test_failed_add_leaves_no_record_file() {
        let temp_dir = TempDir::new().unwrap();
        let configurations = UserConfigurations::new(temp_dir.path());
        configurations
            .add_configuration("a", "", props(&[("k", "v")]))
            .unwrap();

        // A directory in place of the catalog file makes the write fail.
        let catalog = temp_dir.path().join(CatalogConfig::CATALOG_FILE_NAME);
        fs::remove_file(&catalog).unwrap();
        fs::create_dir(&catalog).unwrap();

        let before: usize = fs::read_dir(temp_dir.path()).unwrap().count();
        assert!(configurations
            .try_add_configuration("b", "", props(&[("k", "v")]))
            .is_err());
        let after: usize = fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(before, after);
    }

    #[test]
    fn test_damaged_catalog_without_backup_is_set_aside() {
        let temp_dir = TempDir::new().unwrap();
        let id = {
            let configurations = UserConfigurations::new(temp_dir.path());
            configurations
                .add_configuration("a", "", props(&[("k", "v")]))
                .unwrap()
        };

        let catalog = temp_dir.path().join(CatalogConfig::CATALOG_FILE_NAME);
        write_file(&catalog, |w| {
            w.write_all(b"{\"format\": ")?;
            Ok(())
        })
        .unwrap();

        let configurations = UserConfigurations::new(temp_dir.path());
        let corrupt: Vec<PathBuf> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "corrupt"))
            .collect();
        assert_eq!(corrupt.len(), 1);

        // The record was re-imported under a fresh identifier.
        let details = configurations.configuration_details();
        assert_eq!(details.len(), 1);
        let reissued = details.iter().next().unwrap().key().to_string();
        assert_ne!(reissued, id);
        assert_eq!(
            configurations.configuration(&reissued).unwrap(),
            props(&[("k", "v")])
        );
    }

    #[test]
    fn test_catalog_with_invalid_utf8_is_set_aside() {
        let temp_dir = TempDir::new().unwrap();
        {
            let configurations = UserConfigurations::new(temp_dir.path());
            configurations
                .add_configuration("a", "", props(&[("k", "v")]))
                .unwrap();
        }

        let catalog = temp_dir.path().join(CatalogConfig::CATALOG_FILE_NAME);
        fs::write(&catalog, [0xffu8, 0xfe, 0x00, 0x81]).unwrap();

        let configurations = UserConfigurations::new(temp_dir.path());
        let corrupt = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|e| e == "corrupt"))
            .count();
        assert_eq!(corrupt, 1);
        assert_eq!(configurations.configuration_details().len(), 1);

        configurations
            .try_add_configuration("b", "", props(&[("k", "w")]))
            .unwrap();
        configurations.reconcile().unwrap();
        assert_eq!(configurations.configuration_details().len(), 2);
    }

    #[test]
    fn test_refresh_under_held_state() {
        let temp_dir = TempDir::new().unwrap();
        let configurations = UserConfigurations::new(temp_dir.path());
        let other = UserConfigurations::new(temp_dir.path());
        let storage = configurations.storage().unwrap();

        let mut state = storage.lock_state().unwrap();
        let id = other
            .add_configuration("a", "", props(&[("k", "v")]))
            .unwrap();
        assert!(!state.inventory.contains(&id));

        storage
            .sync_state(&mut *state, |_, _| Ok(((), false)))
            .unwrap();
        assert!(state.inventory.contains(&id));
        drop(state);

        let mut state = storage.refreshed_state().unwrap();
        assert!(state.inventory.get_mut(&id).is_some());
        drop(state);
        assert!(configurations.contains_configuration(&id));
    }
}
