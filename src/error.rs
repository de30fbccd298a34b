/*!
 * Error types for Patchbay
 */

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, PatchError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

/// Error code recorded when the caller aborts a transfer
pub const ABORT_CODE: i64 = 0;

/// Message recorded when the caller aborts a transfer
pub const ABORT_MESSAGE: &str = "user abort";

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Manifest could not be loaded, validated or queried
    #[error("Manifest error: {0}")]
    Manifest(#[from] patchbay_core_manifest::Error),

    /// Asset path is absent from the manifest or was marked invalid upstream
    #[error("Invalid asset reference '{path}': {reason}")]
    InvalidAssetReference { path: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A bundle transfer failed permanently after its retry budget
    #[error("Transfer of bundle '{bundle}' failed (code {code}): {message}")]
    TransferFailed {
        bundle: String,
        code: i64,
        message: String,
    },

    /// The caller aborted the operation
    #[error("Operation aborted by user")]
    Aborted,

    /// Async runtime unavailable or task failure
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl PatchError {
    /// Build an invalid-asset error
    pub fn invalid_asset(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PatchError::InvalidAssetReference {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PatchError::Manifest(_)
            | PatchError::InvalidAssetReference { .. }
            | PatchError::Config(_)
            | PatchError::Runtime(_) => EXIT_FATAL,
            PatchError::TransferFailed { .. } | PatchError::Aborted | PatchError::Io(_) => {
                EXIT_PARTIAL
            }
        }
    }

    /// Check if this error is fatal (should not retry)
    pub fn is_fatal(&self) -> bool {
        match self {
            PatchError::Manifest(_) => true,
            PatchError::InvalidAssetReference { .. } => true,
            PatchError::Config(_) => true,
            PatchError::Runtime(_) => true,
            PatchError::Aborted => true,

            // A retry budget was already spent, but a new batch may succeed
            PatchError::TransferFailed { .. } => false,
            PatchError::Io(_) => false,
        }
    }

    /// Check if this error is transient (temporary, worth retrying)
    pub fn is_transient(&self) -> bool {
        match self {
            PatchError::Io(io_err) => Self::is_io_transient(io_err),
            PatchError::TransferFailed { .. } => true,
            _ => false,
        }
    }

    fn is_io_transient(io_err: &io::Error) -> bool {
        use io::ErrorKind::*;
        matches!(
            io_err.kind(),
            ConnectionRefused
                | ConnectionReset
                | ConnectionAborted
                | NotConnected
                | BrokenPipe
                | TimedOut
                | Interrupted
                | WouldBlock
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            PatchError::Manifest(e) if e.is_resolution_error() => ErrorCategory::Resolution,
            PatchError::Manifest(_) => ErrorCategory::Manifest,
            PatchError::InvalidAssetReference { .. } => ErrorCategory::Resolution,
            PatchError::Config(_) => ErrorCategory::Configuration,
            PatchError::Io(_) => ErrorCategory::IoError,
            PatchError::TransferFailed { .. } => ErrorCategory::Network,
            PatchError::Aborted => ErrorCategory::Cancelled,
            PatchError::Runtime(_) => ErrorCategory::Runtime,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Manifest parsing/validation errors
    Manifest,
    /// Unknown asset path or bundle
    Resolution,
    /// Configuration errors
    Configuration,
    /// I/O operation errors
    IoError,
    /// Network/transfer errors
    Network,
    /// Caller-initiated abort
    Cancelled,
    /// Async runtime errors
    Runtime,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Manifest => write!(f, "manifest"),
            ErrorCategory::Resolution => write!(f, "resolution"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Cancelled => write!(f, "cancelled"),
            ErrorCategory::Runtime => write!(f, "runtime"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_errors_are_fatal() {
        let unknown: PatchError = patchbay_core_manifest::Error::unknown_asset("a.png").into();
        assert!(unknown.is_fatal());
        assert_eq!(unknown.category(), ErrorCategory::Resolution);
        assert_eq!(unknown.exit_code(), EXIT_FATAL);

        let invalid = PatchError::invalid_asset("b.png", "marked invalid");
        assert!(invalid.is_fatal());
        assert_eq!(invalid.category(), ErrorCategory::Resolution);
    }

    #[test]
    fn test_transfer_failure_is_partial() {
        let err = PatchError::TransferFailed {
            bundle: "ui".into(),
            code: 503,
            message: "Service Unavailable".into(),
        };
        assert!(!err.is_fatal());
        assert!(err.is_transient());
        assert_eq!(err.exit_code(), EXIT_PARTIAL);
        assert!(err.to_string().contains("code 503"));
    }

    #[test]
    fn test_io_transient_detection() {
        let timeout = PatchError::Io(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(timeout.is_transient());

        let denied = PatchError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert!(!denied.is_transient());
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Network.to_string(), "network");
        assert_eq!(PatchError::Aborted.category().to_string(), "cancelled");
    }
}
