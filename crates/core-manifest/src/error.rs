//! Error types for manifest operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during manifest operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Manifest validation failed
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Schema version mismatch
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    /// Manifest file not found
    #[error("Manifest not found: {path}")]
    ManifestNotFound { path: PathBuf },

    /// Asset path is not listed in the manifest
    #[error("Unknown asset path: {path}")]
    UnknownAsset { path: String },

    /// Bundle name is not listed in the manifest
    #[error("Unknown bundle: {name}")]
    UnknownBundle { name: String },
}

impl Error {
    /// Create a validation error with a message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Create a version mismatch error
    pub fn version_mismatch<S: Into<String>>(expected: S, found: S) -> Self {
        Error::VersionMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a manifest not found error
    pub fn manifest_not_found<P: Into<PathBuf>>(path: P) -> Self {
        Error::ManifestNotFound { path: path.into() }
    }

    /// Create an unknown asset error
    pub fn unknown_asset<S: Into<String>>(path: S) -> Self {
        Error::UnknownAsset { path: path.into() }
    }

    /// Create an unknown bundle error
    pub fn unknown_bundle<S: Into<String>>(name: S) -> Self {
        Error::UnknownBundle { name: name.into() }
    }

    /// True for lookups that failed because the manifest does not know the name
    pub fn is_resolution_error(&self) -> bool {
        matches!(self, Error::UnknownAsset { .. } | Error::UnknownBundle { .. })
    }
}
