#![warn(missing_docs)]

//! File layer for codeshift
//!
//! Provides the filesystem abstraction the engine writes through, atomic
//! local writes with read-back verification, a deterministic line diff, and
//! per-attempt snapshot backups that can be restored path by path.

pub mod backup;
pub mod diff;
pub mod error;
pub mod fs;
pub mod models;
pub mod verifier;

// Re-export public API
pub use backup::{Backup, BackupManager, RestoreOutcome, SnapshotEntry};
pub use diff::DiffEngine;
pub use error::FileError;
pub use fs::{FileSystem, LocalFileSystem, MemoryFileSystem};
pub use models::{DiffHunk, DiffLine, DiffResult, DiffStats};
pub use verifier::ContentVerifier;
