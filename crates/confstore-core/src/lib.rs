//! Confstore Core - durable configuration catalog shared between processes.
//!
//! Configurations (property maps with descriptive details) are stored one per
//! file in a directory, next to an index of identifiers. Any number of
//! processes may use the same directory: every change is made under an
//! advisory file lock, the index is rewritten under a backup, and the catalog
//! repairs itself after crashes or hand edits.
//!
//! # Example
//!
//! ```rust,ignore
//! use confstore_core::{Properties, UserConfigurations};
//!
//! let configurations = UserConfigurations::new("/path/to/configurations");
//!
//! let mut properties = Properties::new();
//! properties.insert("paper-size".into(), "A4".into());
//! let id = configurations
//!     .add_configuration("Default", "Print settings", properties)
//!     .expect("catalog available");
//!
//! println!("{:?}", configurations.configuration(&id));
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod lock;
pub mod platform;
pub mod providers;
pub mod record;
pub mod store;

// Re-export commonly used types
pub use catalog::{ReconcileReport, UserConfigurations, UserConfigurationsBuilder};
pub use config::{CatalogConfig, LockRetryConfig};
pub use error::{CatalogError, Result};
pub use lock::{acquire_with_retry, ExclusiveAccess, FileLock};
pub use platform::default_catalog_dir;
pub use providers::{
    ConfigurationsCatalog, ConfigurationsCatalogBuilder, ConfigurationsProvider, MemoryProvider,
    UserConfigurationsProvider,
};
pub use record::{Configuration, ConfigurationDetails, Properties, RecordEncoding};
pub use store::{CatalogEntry, Inventory};
