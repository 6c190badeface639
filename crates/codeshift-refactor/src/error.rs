//! Error types for planning and applying changes

use std::path::PathBuf;

use codeshift_files::FileError;
use thiserror::Error;

use crate::types::{ChangeId, ChangeStatus};

/// Result type for refactoring operations
pub type Result<T> = std::result::Result<T, RefactorError>;

/// Errors that can occur while planning or applying a change plan
#[derive(Debug, Error)]
pub enum RefactorError {
    /// More candidate files than the configured ceiling
    #[error("Too many files: {count} candidates exceed the limit of {max_files}")]
    TooManyFiles {
        /// Candidates left after filtering
        count: usize,
        /// Configured ceiling
        max_files: usize,
    },

    /// A planned change targets a file larger than the configured ceiling
    #[error("File too large: {} is {size} bytes (limit {max_bytes})", path.display())]
    FileTooLarge {
        /// Offending file
        path: PathBuf,
        /// Its size in bytes
        size: u64,
        /// Configured ceiling
        max_bytes: u64,
    },

    /// The plan violates a structural invariant
    #[error("Plan conflict: {0}")]
    PlanConflict(String),

    /// The dependency graph contains a cycle
    #[error("Cyclic dependency between changes: {}", join_ids(members))]
    CyclicDependency {
        /// Every change left unordered
        members: Vec<ChangeId>,
    },

    /// An analysis response could not be parsed
    #[error("Could not parse analysis response: {0}")]
    AnalysisParse(String),

    /// No code could be extracted from a generation response
    #[error("Generation failed for {change_id}: no code content in response")]
    GenerationFailure {
        /// Change whose content was being generated
        change_id: ChangeId,
        /// The response as received
        raw_response: String,
    },

    /// Writing or removing a file failed while applying
    #[error("Failed to apply {change_id} to {}: {message}", path.display())]
    ApplyIo {
        /// Change being applied
        change_id: ChangeId,
        /// Path the write targeted
        path: PathBuf,
        /// Underlying failure
        message: String,
    },

    /// Restoring a path from backup failed during rollback
    #[error("Failed to restore {}: {message}", path.display())]
    RestoreIo {
        /// Path that could not be restored
        path: PathBuf,
        /// Underlying failure
        message: String,
    },

    /// A change status transition would move backwards
    #[error("Invalid status transition for {change_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Change whose status was being set
        change_id: ChangeId,
        /// Current status
        from: ChangeStatus,
        /// Requested status
        to: ChangeStatus,
    },

    /// An operation was called with the plan in the wrong state
    #[error("Invalid plan state: {0}")]
    InvalidState(String),

    /// The run was cancelled
    #[error("Cancelled before {0}")]
    Cancelled(ChangeId),

    /// A collaborator call failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// File layer error
    #[error("File error: {0}")]
    File(#[from] FileError),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl RefactorError {
    /// Stable name of the error kind, as used in serialized results
    pub fn kind(&self) -> &'static str {
        match self {
            RefactorError::TooManyFiles { .. } => "too_many_files",
            RefactorError::FileTooLarge { .. } => "file_too_large",
            RefactorError::PlanConflict(_) => "plan_conflict",
            RefactorError::CyclicDependency { .. } => "cyclic_dependency",
            RefactorError::AnalysisParse(_) => "analysis_parse_error",
            RefactorError::GenerationFailure { .. } => "generation_failure",
            RefactorError::ApplyIo { .. } => "apply_io_error",
            RefactorError::RestoreIo { .. } => "restore_io_error",
            RefactorError::InvalidTransition { .. } => "invalid_transition",
            RefactorError::InvalidState(_) => "invalid_state",
            RefactorError::Cancelled(_) => "cancelled",
            RefactorError::Provider(_) => "provider_error",
            RefactorError::ConfigError(_) | RefactorError::InvalidConfiguration(_) => "config_error",
            RefactorError::File(_) => "file_error",
            RefactorError::JsonError(_) => "json_error",
            RefactorError::YamlError(_) => "yaml_error",
        }
    }
}

fn join_ids(ids: &[ChangeId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
