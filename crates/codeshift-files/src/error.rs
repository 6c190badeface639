//! Error types for file operations

use std::path::{Path, PathBuf};

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// File not found at the specified path
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Permission denied for the operation
    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    /// Invalid path provided
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Content verification failed
    #[error("Content verification failed: {0}")]
    VerificationFailed(String),

    /// Backup operation failed
    #[error("Backup failed: {0}")]
    BackupFailed(String),

    /// Backup integrity check failed: hash mismatch
    #[error("Backup integrity check failed for {}: hash mismatch", .0.display())]
    BackupCorrupted(PathBuf),

    /// Hunks could not be replayed against the given text
    #[error("Diff application failed: {0}")]
    DiffError(String),

    /// IO error tied to a path
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path the operation targeted
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FileError {
    /// Maps an IO error to the most specific variant for `path`
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FileError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => FileError::PermissionDenied(path.to_path_buf()),
            _ => FileError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Returns true if the error means the path does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            FileError::NotFound(_) => true,
            FileError::Io { source, .. } | FileError::IoError(source) => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
