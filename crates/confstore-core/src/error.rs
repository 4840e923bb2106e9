//! Error types for the configuration catalog.
//!
//! Decode errors (malformed snapshot or XML documents) are kept apart from I/O
//! errors so that callers can recover from a corrupt file without masking a
//! failing disk.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Malformed configuration document {path}: {message}")]
    Xml { path: PathBuf, message: String },

    #[error("Unexpected document in {path}: expected {expected}, found {found}")]
    FormatMismatch {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },

    #[error("Unsupported {format} version {found} in {path} (newest supported is {supported})")]
    UnsupportedVersion {
        path: PathBuf,
        format: &'static str,
        found: u32,
        supported: u32,
    },

    // Lock errors
    #[error("Lock {path} is held elsewhere, gave up after {attempts} attempts")]
    LockUnavailable { path: PathBuf, attempts: u32 },

    #[error("Failed to acquire lock {path}: {message}")]
    LockFailed {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Catalog errors
    #[error("Catalog directory is not available")]
    DirectoryUnavailable,

    #[error("Configuration not found: {identifier}")]
    NotFound { identifier: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl CatalogError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CatalogError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create an XML decode/encode error for a document.
    pub fn xml(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CatalogError::Xml {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this error means the file content could not be decoded.
    ///
    /// Decode errors are recoverable: the affected file is dropped or restored
    /// from a backup. Anything else points at the environment and is propagated.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            CatalogError::Json { .. }
                | CatalogError::Xml { .. }
                | CatalogError::FormatMismatch { .. }
                | CatalogError::UnsupportedVersion { .. }
        )
    }

    /// Check if this error is a lock acquisition failure.
    pub fn is_lock_error(&self) -> bool {
        matches!(
            self,
            CatalogError::LockUnavailable { .. } | CatalogError::LockFailed { .. }
        )
    }
}
