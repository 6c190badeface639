//! Filesystem abstraction used by the engine
//!
//! Every read, write and removal the engine performs goes through
//! [`FileSystem`], so failures surface as typed [`FileError`]s and tests can
//! swap the local disk for [`MemoryFileSystem`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::FileError;

/// Read/write/delete/exists access to paths
#[async_trait]
pub trait FileSystem: Send + Sync + std::fmt::Debug {
    /// Reads the full content of a file
    async fn read(&self, path: &Path) -> Result<Vec<u8>, FileError>;

    /// Writes content to a file, creating parent directories as needed
    async fn write(&self, path: &Path, content: &[u8]) -> Result<(), FileError>;

    /// Removes a file
    async fn delete(&self, path: &Path) -> Result<(), FileError>;

    /// Returns whether a file exists at `path`
    async fn exists(&self, path: &Path) -> Result<bool, FileError>;

    /// Removes a directory and everything below it; missing directories are not an error
    async fn remove_dir_all(&self, path: &Path) -> Result<(), FileError>;

    /// Reads a file as text, replacing invalid UTF-8 sequences
    async fn read_to_string(&self, path: &Path) -> Result<String, FileError> {
        let bytes = self.read(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Local disk implementation with atomic writes
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Creates a new LocalFileSystem instance
    pub fn new() -> Self {
        LocalFileSystem
    }

    /// Generates a sibling temporary path for atomic writes
    fn temp_path(path: &Path) -> PathBuf {
        let mut temp_path = path.to_path_buf();
        let file_name = format!(
            ".tmp-{}-{}",
            Uuid::new_v4().simple(),
            path.file_name().and_then(|n| n.to_str()).unwrap_or("file")
        );
        temp_path.set_file_name(file_name);
        temp_path
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, FileError> {
        fs::read(path).await.map_err(|e| FileError::from_io(path, e))
    }

    async fn write(&self, path: &Path, content: &[u8]) -> Result<(), FileError> {
        if path.file_name().is_none() {
            return Err(FileError::InvalidPath(format!(
                "{} has no file name",
                path.display()
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FileError::from_io(parent, e))?;
            }
        }

        // Write to a temporary sibling and rename over the target
        let temp_path = Self::temp_path(path);
        fs::write(&temp_path, content)
            .await
            .map_err(|e| FileError::from_io(path, e))?;

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(FileError::from_io(path, e));
        }

        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), FileError> {
        fs::remove_file(path)
            .await
            .map_err(|e| FileError::from_io(path, e))
    }

    async fn exists(&self, path: &Path) -> Result<bool, FileError> {
        fs::try_exists(path)
            .await
            .map_err(|e| FileError::from_io(path, e))
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), FileError> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileError::from_io(path, e)),
        }
    }
}

/// In-memory filesystem keyed by path
///
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    files: Arc<RwLock<BTreeMap<PathBuf, Vec<u8>>>>,
}

impl MemoryFileSystem {
    /// Creates an empty in-memory filesystem
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filesystem pre-populated with the given files
    pub fn with_files<P, C>(files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<PathBuf>,
        C: Into<Vec<u8>>,
    {
        let map = files
            .into_iter()
            .map(|(path, content)| (path.into(), content.into()))
            .collect();
        Self {
            files: Arc::new(RwLock::new(map)),
        }
    }

    /// Returns a copy of every stored file
    pub async fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        self.files.read().await.clone()
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, FileError> {
        self.files
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| FileError::NotFound(path.to_path_buf()))
    }

    async fn write(&self, path: &Path, content: &[u8]) -> Result<(), FileError> {
        if path.file_name().is_none() {
            return Err(FileError::InvalidPath(format!(
                "{} has no file name",
                path.display()
            )));
        }
        self.files
            .write()
            .await
            .insert(path.to_path_buf(), content.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), FileError> {
        self.files
            .write()
            .await
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FileError::NotFound(path.to_path_buf()))
    }

    async fn exists(&self, path: &Path) -> Result<bool, FileError> {
        Ok(self.files.read().await.contains_key(path))
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), FileError> {
        self.files
            .write()
            .await
            .retain(|stored, _| !stored.starts_with(path));
        Ok(())
    }
}
