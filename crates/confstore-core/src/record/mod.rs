//! Configuration records.
//!
//! A record is a key/value property bag plus descriptive metadata. Records are
//! stored one per file, either as a versioned JSON snapshot (any property value)
//! or as a human-editable XML document (string values only).

mod details;
mod snapshot;
mod xml;

pub use details::{ConfigurationDetails, ConfigurationDetailsBuilder};

use crate::error::{CatalogError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Flat property map of a configuration.
pub type Properties = BTreeMap<String, Value>;

/// A configuration that can be written to file and subsequently restored.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    details: ConfigurationDetails,
    properties: Properties,
}

impl Configuration {
    pub fn new(details: ConfigurationDetails, properties: Properties) -> Self {
        Self {
            details,
            properties,
        }
    }

    /// Start building a configuration with the given details.
    pub fn builder(details: ConfigurationDetails) -> ConfigurationBuilder {
        ConfigurationBuilder {
            details,
            properties: Properties::new(),
        }
    }

    pub fn details(&self) -> &ConfigurationDetails {
        &self.details
    }

    pub fn key(&self) -> &str {
        self.details.key()
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn into_properties(self) -> Properties {
        self.properties
    }

    /// Same content as this configuration, under a different identifier.
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            details: self.details.with_key(key),
            properties: self.properties.clone(),
        }
    }

    /// Returns true if the configuration survives an XML round trip unchanged.
    ///
    /// XML entries carry string values only, so any other value type would be
    /// read back as something else.
    pub fn is_serializable_as_xml(&self) -> bool {
        self.properties.values().all(Value::is_string)
    }

    /// Write the configuration as a snapshot document.
    pub fn write(&self, path: &Path) -> Result<()> {
        snapshot::write(self, path)
    }

    /// Read a snapshot document previously written with [`write`](Self::write).
    pub fn read(path: &Path) -> Result<Self> {
        snapshot::read(path)
    }

    /// Write the configuration as an XML document.
    ///
    /// Fails if [`is_serializable_as_xml`](Self::is_serializable_as_xml) is false.
    pub fn write_xml(&self, path: &Path) -> Result<()> {
        xml::write(self, path)
    }

    /// Read an XML document previously written with [`write_xml`](Self::write_xml).
    pub fn read_xml(path: &Path) -> Result<Self> {
        xml::read(path)
    }

    pub fn to_xml_string(&self) -> Result<String> {
        xml::to_string(self).map_err(|m| CatalogError::xml(xml::INLINE_SOURCE, m))
    }

    pub fn from_xml_str(text: &str) -> Result<Self> {
        xml::from_str(text).map_err(|m| CatalogError::xml(xml::INLINE_SOURCE, m))
    }

    /// Write the configuration using `encoding`.
    pub fn write_as(&self, encoding: RecordEncoding, path: &Path) -> Result<()> {
        match encoding {
            RecordEncoding::Snapshot => self.write(path),
            RecordEncoding::Xml => self.write_xml(path),
        }
    }

    /// Read a record file, picking the decoder from the file extension.
    pub fn read_any(path: &Path) -> Result<Self> {
        match RecordEncoding::from_path(path) {
            Some(RecordEncoding::Xml) => Self::read_xml(path),
            Some(RecordEncoding::Snapshot) => Self::read(path),
            None => Err(CatalogError::FormatMismatch {
                path: path.to_path_buf(),
                expected: "a .json or .xml record file",
                found: path
                    .extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_default(),
            }),
        }
    }
}

/// Builder for [`Configuration`].
#[derive(Debug, Clone)]
pub struct ConfigurationBuilder {
    details: ConfigurationDetails,
    properties: Properties,
}

impl ConfigurationBuilder {
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn build(self) -> Configuration {
        Configuration {
            details: self.details,
            properties: self.properties,
        }
    }
}

/// File format of a per-record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordEncoding {
    /// Versioned JSON snapshot; holds any property value.
    #[default]
    Snapshot,
    /// Human-editable XML; string values only.
    Xml,
}

impl RecordEncoding {
    pub fn extension(&self) -> &'static str {
        match self {
            RecordEncoding::Snapshot => "json",
            RecordEncoding::Xml => "xml",
        }
    }

    /// Encoding implied by a file's extension, if it is a record extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(RecordEncoding::Snapshot),
            "xml" => Some(RecordEncoding::Xml),
            _ => None,
        }
    }

    /// Encoding to actually use for `config`.
    ///
    /// Records that cannot be represented in XML fall back to snapshots.
    pub fn for_configuration(self, config: &Configuration) -> Self {
        match self {
            RecordEncoding::Xml if !config.is_serializable_as_xml() => RecordEncoding::Snapshot,
            other => other,
        }
    }
}
