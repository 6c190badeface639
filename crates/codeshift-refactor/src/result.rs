//! Machine-readable outcome of an apply run

use std::path::PathBuf;

use codeshift_files::{Backup, DiffResult};
use serde::{Deserialize, Serialize};

use crate::error::{RefactorError, Result};
use crate::plan::ChangePlan;
use crate::types::{ChangeId, ChangeStatus, ChangeType, PlanStatus, Priority};

/// Final state of one change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeOutcome {
    /// Change id
    pub id: ChangeId,
    /// Kind of mutation
    pub change_type: ChangeType,
    /// Target path
    pub path: PathBuf,
    /// Source path of a rename
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<PathBuf>,
    /// Reviewer-facing priority
    pub priority: Priority,
    /// Final status
    pub status: ChangeStatus,
    /// Applied and then reverted
    pub rolled_back: bool,
    /// Error recorded against the change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One error from the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultError {
    /// Error kind, see [`RefactorError::kind`]
    pub kind: String,
    /// Change the error belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_id: Option<ChangeId>,
    /// Path the error belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Human-readable message
    pub message: String,
}

impl ResultError {
    /// Builds a result error from an engine error
    pub fn from_error(error: &RefactorError) -> Self {
        let (change_id, path) = match error {
            RefactorError::GenerationFailure { change_id, .. } => (Some(change_id.clone()), None),
            RefactorError::ApplyIo {
                change_id, path, ..
            } => (Some(change_id.clone()), Some(path.clone())),
            RefactorError::RestoreIo { path, .. } => (None, Some(path.clone())),
            RefactorError::FileTooLarge { path, .. } => (None, Some(path.clone())),
            RefactorError::InvalidTransition { change_id, .. } => (Some(change_id.clone()), None),
            RefactorError::Cancelled(change_id) => (Some(change_id.clone()), None),
            _ => (None, None),
        };

        Self {
            kind: error.kind().to_string(),
            change_id,
            path,
            message: error.to_string(),
        }
    }

    /// Attaches the change the error belongs to
    pub fn for_change(mut self, change_id: &ChangeId) -> Self {
        if self.change_id.is_none() {
            self.change_id = Some(change_id.clone());
        }
        self
    }
}

/// A snapshotted path in a backup summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntrySummary {
    /// Original path
    pub path: PathBuf,
    /// SHA-256 of the saved content, absent for pure creations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Size of the saved content
    pub size: usize,
}

/// The backup taken during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSummary {
    /// Backup id
    pub id: String,
    /// Snapshot directory
    pub dir: PathBuf,
    /// Whether the directory still exists after the run
    pub retained: bool,
    /// Snapshotted paths in snapshot order
    pub entries: Vec<BackupEntrySummary>,
}

impl BackupSummary {
    /// Summarizes `backup`
    pub fn from_backup(backup: &Backup, retained: bool) -> Self {
        Self {
            id: backup.id.clone(),
            dir: backup.dir.clone(),
            retained,
            entries: backup
                .entries
                .iter()
                .map(|entry| BackupEntrySummary {
                    path: entry.original_path.clone(),
                    content_hash: entry.content_hash.clone(),
                    size: entry.size,
                })
                .collect(),
        }
    }
}

/// Outcome of applying a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefactorResult {
    /// Plan id
    pub plan_id: String,
    /// Instruction the plan was derived from
    pub instruction: String,
    /// Final plan status
    pub status: PlanStatus,
    /// Per-change outcomes in application order
    pub changes: Vec<ChangeOutcome>,
    /// Errors collected during the run
    pub errors: Vec<ResultError>,
    /// Previews of every change that was ready to apply
    pub diffs: Vec<DiffResult>,
    /// Backup taken for the run, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupSummary>,
}

impl RefactorResult {
    /// Builds a result from the plan's current state
    pub fn from_plan(
        plan: &ChangePlan,
        errors: Vec<ResultError>,
        diffs: Vec<DiffResult>,
        backup: Option<BackupSummary>,
    ) -> Self {
        Self {
            plan_id: plan.id.clone(),
            instruction: plan.instruction.clone(),
            status: plan.status,
            changes: plan
                .changes
                .iter()
                .map(|change| ChangeOutcome {
                    id: change.id.clone(),
                    change_type: change.change_type,
                    path: change.path.clone(),
                    previous_path: change.previous_path.clone(),
                    priority: change.priority,
                    status: change.status,
                    rolled_back: change.rolled_back,
                    error: change.error.clone(),
                })
                .collect(),
            errors,
            diffs,
            backup,
        }
    }

    /// Whether the run ended without errors in a completed or previewed state
    pub fn success(&self) -> bool {
        self.errors.is_empty()
            && matches!(self.status, PlanStatus::Completed | PlanStatus::DryRun)
    }

    /// Changes that were applied and remain applied
    pub fn files_changed(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| c.status == ChangeStatus::Applied && !c.rolled_back)
            .count()
    }

    /// Changes that failed
    pub fn files_failed(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| c.status == ChangeStatus::Failed)
            .count()
    }

    /// Serializes the result as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
