//! Snapshot backups taken before files are mutated
//!
//! A [`Backup`] is a directory under the backup root, keyed by its creation
//! timestamp. Each snapshotted path gets one entry: either a saved copy of
//! its original bytes, or a marker saying the path did not exist (a pure
//! creation, undone by removal). A `manifest.json` next to the copies lists
//! the entries so a retained backup can be inspected or reloaded later.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FileError;
use crate::fs::FileSystem;
use crate::verifier::ContentVerifier;

const MANIFEST_FILE: &str = "manifest.json";

/// One snapshotted path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Path that was snapshotted
    pub original_path: PathBuf,
    /// Where the saved copy lives; `None` if the path did not exist
    pub backup_path: Option<PathBuf>,
    /// SHA-256 of the saved copy
    pub content_hash: Option<String>,
    /// Size of the saved copy in bytes
    pub size: usize,
}

impl SnapshotEntry {
    /// Returns true if the path did not exist when snapshotted
    pub fn was_absent(&self) -> bool {
        self.backup_path.is_none()
    }
}

/// A set of snapshots taken during one apply attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    /// Timestamp key of this backup
    pub id: String,
    /// Directory holding the saved copies
    pub dir: PathBuf,
    /// When the backup was begun
    pub created_at: DateTime<Utc>,
    /// Entries in snapshot order
    pub entries: Vec<SnapshotEntry>,
}

impl Backup {
    /// Returns the entry for `path`, if it was snapshotted
    pub fn entry(&self, path: &Path) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|e| e.original_path == path)
    }

    /// Returns true if `path` was snapshotted
    pub fn contains(&self, path: &Path) -> bool {
        self.entry(path).is_some()
    }

    /// Number of snapshotted paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was snapshotted
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of restoring one snapshotted path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestoreOutcome {
    /// Original content written back
    Restored {
        /// Restored path
        path: PathBuf,
    },
    /// Path did not exist before and was removed
    Removed {
        /// Removed path
        path: PathBuf,
    },
    /// Restoring the path failed
    Failed {
        /// Path that could not be restored
        path: PathBuf,
        /// Why restoration failed
        error: String,
    },
}

impl RestoreOutcome {
    /// The path this outcome refers to
    pub fn path(&self) -> &Path {
        match self {
            RestoreOutcome::Restored { path }
            | RestoreOutcome::Removed { path }
            | RestoreOutcome::Failed { path, .. } => path,
        }
    }

    /// Returns true if restoration of the path failed
    pub fn is_failure(&self) -> bool {
        matches!(self, RestoreOutcome::Failed { .. })
    }
}

/// Manages backup creation, restoration and removal
#[derive(Debug, Clone)]
pub struct BackupManager {
    fs: Arc<dyn FileSystem>,
    backup_root: PathBuf,
    verifier: ContentVerifier,
}

impl BackupManager {
    /// Creates a new BackupManager instance
    ///
    /// # Arguments
    ///
    /// * `fs` - Filesystem used for both snapshots and restores
    /// * `backup_root` - Directory under which each backup gets its own folder
    pub fn new(fs: Arc<dyn FileSystem>, backup_root: impl Into<PathBuf>) -> Self {
        BackupManager {
            fs,
            backup_root: backup_root.into(),
            verifier: ContentVerifier::new(),
        }
    }

    /// Directory under which backups are created
    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Begins a new, empty backup keyed by the current timestamp
    pub fn begin_backup(&self) -> Backup {
        let created_at = Utc::now();
        let id = format!(
            "{}-{}",
            created_at.format("%Y%m%d_%H%M%S_%f"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let dir = self.backup_root.join(&id);

        tracing::debug!(backup_id = %id, dir = ?dir, "Backup started");

        Backup {
            id,
            dir,
            created_at,
            entries: Vec::new(),
        }
    }

    /// Snapshots the current content of `path`
    ///
    /// A missing path is recorded as absent. Returns `false` if the path was
    /// already snapshotted, in which case the first capture is kept.
    pub async fn snapshot(&self, backup: &mut Backup, path: &Path) -> Result<bool, FileError> {
        if backup.contains(path) {
            return Ok(false);
        }

        let content = match self.fs.read(path).await {
            Ok(content) => Some(content),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                return Err(FileError::BackupFailed(format!(
                    "Failed to read {} for backup: {}",
                    path.display(),
                    e
                )))
            }
        };

        self.snapshot_content(backup, path, content.as_deref()).await
    }

    /// Snapshots content the caller already holds for `path`
    ///
    /// `None` records the path as absent. Idempotent like [`Self::snapshot`].
    pub async fn snapshot_content(
        &self,
        backup: &mut Backup,
        path: &Path,
        content: Option<&[u8]>,
    ) -> Result<bool, FileError> {
        if backup.contains(path) {
            return Ok(false);
        }

        let entry = match content {
            Some(content) => {
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("file");
                let backup_path = backup
                    .dir
                    .join(format!("{:04}-{}.bak", backup.entries.len(), file_name));

                self.fs.write(&backup_path, content).await.map_err(|e| {
                    FileError::BackupFailed(format!(
                        "Failed to write backup of {}: {}",
                        path.display(),
                        e
                    ))
                })?;

                SnapshotEntry {
                    original_path: path.to_path_buf(),
                    backup_path: Some(backup_path),
                    content_hash: Some(ContentVerifier::compute_hash(content)),
                    size: content.len(),
                }
            }
            None => SnapshotEntry {
                original_path: path.to_path_buf(),
                backup_path: None,
                content_hash: None,
                size: 0,
            },
        };

        tracing::debug!(
            backup_id = %backup.id,
            path = ?path,
            absent = entry.was_absent(),
            "Snapshot taken"
        );

        backup.entries.push(entry);
        self.write_manifest(backup).await?;
        Ok(true)
    }

    /// Reads the saved content of a snapshotted path, verifying its hash
    ///
    /// Returns `None` if the path was recorded as absent.
    pub async fn saved_content(
        &self,
        entry: &SnapshotEntry,
    ) -> Result<Option<Vec<u8>>, FileError> {
        let Some(backup_path) = &entry.backup_path else {
            return Ok(None);
        };

        let content = self.fs.read(backup_path).await.map_err(|e| {
            FileError::BackupFailed(format!(
                "Failed to read backup file {}: {}",
                backup_path.display(),
                e
            ))
        })?;

        if let Some(hash) = &entry.content_hash {
            self.verifier.verify_snapshot(backup_path, &content, hash)?;
        }

        Ok(Some(content))
    }

    /// Restores every snapshotted path, newest snapshot first
    ///
    /// A failure on one path is recorded and restoration continues with the
    /// remaining paths.
    pub async fn restore(&self, backup: &Backup) -> Vec<RestoreOutcome> {
        let mut outcomes = Vec::with_capacity(backup.entries.len());

        for entry in backup.entries.iter().rev() {
            let outcome = match self.restore_entry(entry).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        backup_id = %backup.id,
                        path = ?entry.original_path,
                        error = %e,
                        "Failed to restore path"
                    );
                    RestoreOutcome::Failed {
                        path: entry.original_path.clone(),
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        tracing::info!(
            backup_id = %backup.id,
            restored = outcomes.len() - failed,
            failed,
            "Backup restored"
        );

        outcomes
    }

    /// Removes a backup directory and everything in it
    pub async fn discard(&self, backup: Backup) -> Result<(), FileError> {
        self.fs.remove_dir_all(&backup.dir).await?;
        tracing::debug!(backup_id = %backup.id, "Backup discarded");
        Ok(())
    }

    /// Reloads a retained backup from its manifest
    pub async fn load(&self, dir: &Path) -> Result<Backup, FileError> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = self.fs.read(&manifest_path).await?;
        serde_json::from_slice(&raw).map_err(|e| {
            FileError::BackupFailed(format!(
                "Failed to parse backup manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })
    }

    async fn restore_entry(&self, entry: &SnapshotEntry) -> Result<RestoreOutcome, FileError> {
        let path = &entry.original_path;

        match self.saved_content(entry).await? {
            Some(content) => {
                self.fs.write(path, &content).await?;
                Ok(RestoreOutcome::Restored { path: path.clone() })
            }
            None => {
                if self.fs.exists(path).await? {
                    self.fs.delete(path).await?;
                }
                Ok(RestoreOutcome::Removed { path: path.clone() })
            }
        }
    }

    async fn write_manifest(&self, backup: &Backup) -> Result<(), FileError> {
        let manifest = serde_json::to_vec_pretty(backup).map_err(|e| {
            FileError::BackupFailed(format!("Failed to serialize backup manifest: {}", e))
        })?;

        self.fs
            .write(&backup.dir.join(MANIFEST_FILE), &manifest)
            .await
            .map_err(|e| FileError::BackupFailed(format!("Failed to write backup manifest: {}", e)))
    }
}
