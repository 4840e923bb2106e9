//! Platform abstraction layer.
//!
//! Platform-specific locations live here rather than scattered throughout the
//! codebase.

pub mod paths;

pub use paths::default_catalog_dir;
