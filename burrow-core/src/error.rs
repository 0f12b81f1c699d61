//! Error types for Burrow

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for Burrow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Burrow operations
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem operation failed on a specific path
    #[error("Failed to {op} {}: {source}", .path.display())]
    Fs {
        /// What was being attempted (e.g. "create directory")
        op: &'static str,
        /// Path the operation targeted
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// A lock was requested on a directory that does not exist
    #[error("Cannot lock {}: directory does not exist", .0.display())]
    MissingTarget(PathBuf),

    /// Owner or repository name cannot be used as a path component
    #[error("Invalid repository key: {0}")]
    InvalidKey(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Git command or repository error
    #[error("Git error: {0}")]
    Git(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap an IO error with the operation and path it came from
    pub fn fs(op: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Fs {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fs_error_mentions_path_and_cause() {
        let err = Error::fs(
            "create directory",
            "/base/acme",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("create directory"));
        assert!(msg.contains("/base/acme"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_missing_target_message() {
        let err = Error::MissingTarget(PathBuf::from("/base/acme/widgets"));
        assert!(err.to_string().contains("/base/acme/widgets"));
    }
}
