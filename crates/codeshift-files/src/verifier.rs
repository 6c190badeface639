//! Content verification and integrity checking

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::FileError;
use crate::fs::FileSystem;

/// Verifies file integrity through content comparison and hashing
#[derive(Debug, Clone, Default)]
pub struct ContentVerifier;

impl ContentVerifier {
    /// Creates a new ContentVerifier instance
    pub fn new() -> Self {
        ContentVerifier
    }

    /// Computes the hex SHA-256 of content
    pub fn compute_hash(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }

    /// Verifies that written content matches the source byte-for-byte
    ///
    /// # Arguments
    ///
    /// * `fs` - Filesystem the content was written through
    /// * `path` - Path to the written file
    /// * `expected` - Expected content
    pub async fn verify_write(
        &self,
        fs: &dyn FileSystem,
        path: &Path,
        expected: &[u8],
    ) -> Result<(), FileError> {
        let written = fs.read(path).await.map_err(|e| {
            FileError::VerificationFailed(format!(
                "Failed to read written file {}: {}",
                path.display(),
                e
            ))
        })?;

        if written == expected {
            Ok(())
        } else {
            Err(FileError::VerificationFailed(format!(
                "Written content of {} does not match source",
                path.display()
            )))
        }
    }

    /// Verifies that a removed path no longer exists
    pub async fn verify_removed(&self, fs: &dyn FileSystem, path: &Path) -> Result<(), FileError> {
        if fs.exists(path).await? {
            Err(FileError::VerificationFailed(format!(
                "{} still exists after removal",
                path.display()
            )))
        } else {
            Ok(())
        }
    }

    /// Verifies snapshot content against its stored hash
    ///
    /// # Arguments
    ///
    /// * `backup_path` - Where the content was read from, for error reporting
    /// * `content` - Snapshot bytes
    /// * `stored_hash` - Hash recorded when the snapshot was taken
    pub fn verify_snapshot(
        &self,
        backup_path: &Path,
        content: &[u8],
        stored_hash: &str,
    ) -> Result<(), FileError> {
        if Self::compute_hash(content) == stored_hash {
            Ok(())
        } else {
            Err(FileError::BackupCorrupted(backup_path.to_path_buf()))
        }
    }
}
