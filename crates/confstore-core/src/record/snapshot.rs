//! Versioned JSON snapshot of a single record.

use super::{Configuration, ConfigurationDetails, Properties};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::store::atomic::{read_json, write_file};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Serialize)]
struct RecordDocumentRef<'a> {
    format: &'static str,
    version: u32,
    details: &'a ConfigurationDetails,
    properties: &'a Properties,
}

#[derive(Deserialize)]
struct RecordDocument {
    format: String,
    version: u32,
    details: ConfigurationDetails,
    #[serde(default)]
    properties: Properties,
}

pub(super) fn write(config: &Configuration, path: &Path) -> Result<()> {
    let document = RecordDocumentRef {
        format: CatalogConfig::RECORD_FORMAT,
        version: CatalogConfig::RECORD_VERSION,
        details: &config.details,
        properties: &config.properties,
    };

    write_file(path, |w| {
        serde_json::to_writer_pretty(w, &document)?;
        Ok(())
    })?;
    debug!("Wrote configuration {} to {}", config.key(), path.display());
    Ok(())
}

pub(super) fn read(path: &Path) -> Result<Configuration> {
    let document: RecordDocument = read_json(path)?;

    if document.format != CatalogConfig::RECORD_FORMAT {
        return Err(CatalogError::FormatMismatch {
            path: path.to_path_buf(),
            expected: CatalogConfig::RECORD_FORMAT,
            found: document.format,
        });
    }
    if document.version > CatalogConfig::RECORD_VERSION {
        return Err(CatalogError::UnsupportedVersion {
            path: path.to_path_buf(),
            format: CatalogConfig::RECORD_FORMAT,
            found: document.version,
            supported: CatalogConfig::RECORD_VERSION,
        });
    }

    Ok(Configuration::new(document.details, document.properties))
}
