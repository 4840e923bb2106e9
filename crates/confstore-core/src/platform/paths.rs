//! Platform-specific default locations.

use crate::error::{CatalogError, Result};
use std::path::PathBuf;

/// Get the default directory for user configurations.
///
/// # Platform Behavior
/// - **Linux**: `$XDG_CONFIG_HOME/confstore/configurations` or `~/.config/confstore/configurations`
/// - **Windows**: `%APPDATA%\confstore\configurations`
/// - **macOS**: `~/Library/Application Support/confstore/configurations`
pub fn default_catalog_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| CatalogError::Config {
        message: "Could not determine config directory".to_string(),
    })?;
    Ok(config_dir.join("confstore").join("configurations"))
}
