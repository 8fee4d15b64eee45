//! Error types for the acquisition and installation pipeline.
//!
//! These errors never cross the observer boundary: orchestrators fold them
//! into a boolean plus a human-readable message before notifying the UI.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::extractor::RejectReason;

/// Result type for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors that can occur while downloading, extracting or installing.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The archive extension is not one of the supported formats.
    #[error("unsupported archive format: {0} (supported: .zip, .whl, .tar, .tar.gz, .tar.bz2, .tar.xz)")]
    UnsupportedFormat(String),

    /// The archive is corrupt or not an archive at all.
    #[error("invalid archive {}: {reason}", path.display())]
    InvalidArchive { path: PathBuf, reason: String },

    /// Disk-level failure (permission denied, disk full, ...).
    #[error("I/O failure at {}: {source}", path.display())]
    IoFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The operation was cancelled cooperatively.
    #[error("operation cancelled")]
    Cancelled,

    /// Download failed.
    #[error("failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    /// An install strategy could not complete.
    #[error("{strategy} failed: {reason}")]
    InstallerFailed { strategy: String, reason: String },

    /// The item id cannot name a directory under the install base.
    #[error("invalid item id '{id}': {reason}")]
    InvalidItemId { id: String, reason: String },

    /// A request path would resolve outside the directory it is joined to.
    #[error("unsafe path '{path}': {reason}")]
    UnsafePath { path: String, reason: RejectReason },

    /// None of the candidate directories could be used.
    #[error("no writable install destination among: {0}")]
    NoWritableDestination(String),

    /// The release feed could not be fetched or understood.
    #[error("release feed error: {0}")]
    ReleaseFeed(String),
}

impl ManagerError {
    /// Wrap an I/O error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::IoFailure {
            path: path.into(),
            source,
        }
    }

    /// Build an installer failure for the named strategy.
    pub fn installer(strategy: &str, reason: impl Into<String>) -> Self {
        Self::InstallerFailed {
            strategy: strategy.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_display() {
        let err = ManagerError::UnsupportedFormat(".rar".to_string());
        assert!(err.to_string().contains(".rar"));
        assert!(err.to_string().contains(".tar.xz"));
    }

    #[test]
    fn test_io_failure_keeps_source() {
        let err = ManagerError::io(
            "/games/pong",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/games/pong"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_unsafe_path_display() {
        let err = ManagerError::UnsafePath {
            path: "../launch.sh".to_string(),
            reason: RejectReason::PathTraversal,
        };
        assert!(err.to_string().starts_with("unsafe path '../launch.sh'"));
    }

    #[test]
    fn test_installer_failed_display() {
        let err = ManagerError::installer("pip", "exit status 1");
        assert_eq!(err.to_string(), "pip failed: exit status 1");
    }
}
