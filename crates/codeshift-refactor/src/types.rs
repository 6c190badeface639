//! Core types for planned file changes

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RefactorError, Result};

/// Identifier of a change, unique within its plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(String);

impl ChangeId {
    /// Id for the `n`th discovered change (1-based)
    pub fn numbered(n: usize) -> Self {
        ChangeId(format!("change-{}", n))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChangeId {
    fn from(s: &str) -> Self {
        ChangeId(s.to_string())
    }
}

impl From<String> for ChangeId {
    fn from(s: String) -> Self {
        ChangeId(s)
    }
}

/// Kind of mutation a change performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Write a new file
    Create,
    /// Overwrite an existing file
    Modify,
    /// Remove a file
    Delete,
    /// Move a file, possibly with new content
    Rename,
}

impl ChangeType {
    /// Ordering rank used to break ties between changes that are ready together
    pub fn rank(self) -> u8 {
        match self {
            ChangeType::Create => 0,
            ChangeType::Modify => 1,
            ChangeType::Delete => 2,
            ChangeType::Rename => 3,
        }
    }

    /// Whether this change needs generated content
    pub fn needs_content(self) -> bool {
        !matches!(self, ChangeType::Delete)
    }

    /// Lower-case name as used in serialized output
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Modify => "modify",
            ChangeType::Delete => "delete",
            ChangeType::Rename => "rename",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" | "add" | "new" => Ok(ChangeType::Create),
            "modify" | "update" | "edit" => Ok(ChangeType::Modify),
            "delete" | "remove" => Ok(ChangeType::Delete),
            "rename" | "move" => Ok(ChangeType::Rename),
            other => Err(format!("Unknown change type: {}", other)),
        }
    }
}

/// Reviewer-facing priority of a change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Should be reviewed first
    High,
    /// Default priority
    #[default]
    Medium,
    /// Cosmetic or optional
    Low,
}

impl Priority {
    /// Parses a priority leniently, falling back to [`Priority::Medium`]
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Medium,
        }
    }
}

/// Lifecycle of a single change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// Planned, nothing done yet
    Pending,
    /// Content is being generated
    Generating,
    /// Content is available and the change can be applied
    Ready,
    /// Being written to disk
    Applying,
    /// Written and verified
    Applied,
    /// Generation or application failed
    Failed,
    /// Will not be applied
    Skipped,
}

impl ChangeStatus {
    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(self, next: ChangeStatus) -> bool {
        use ChangeStatus::*;
        matches!(
            (self, next),
            (Pending, Generating | Ready | Failed | Skipped)
                | (Generating, Ready | Failed | Skipped)
                | (Ready, Applying | Skipped | Failed)
                | (Applying, Applied | Failed)
        )
    }

    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ChangeStatus::Applied | ChangeStatus::Failed | ChangeStatus::Skipped
        )
    }
}

/// Lifecycle of a whole plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Analysis in progress
    Analyzing,
    /// Analysis done, ready to apply
    Planned,
    /// Previewed without writing
    DryRun,
    /// Waiting for the confirmer
    AwaitingConfirmation,
    /// Writes in progress
    Applying,
    /// Every change applied
    Completed,
    /// A failure occurred and every touched path was restored
    RolledBack,
    /// A failure occurred and at least one path could not be restored
    PartialFailure,
}

impl PlanStatus {
    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Analyzing, Planned)
                | (Planned, DryRun | AwaitingConfirmation)
                | (AwaitingConfirmation, Applying | Planned)
                | (Applying, Completed | RolledBack | PartialFailure)
        )
    }

    /// Whether the plan has reached an outcome
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlanStatus::DryRun
                | PlanStatus::Completed
                | PlanStatus::RolledBack
                | PlanStatus::PartialFailure
        )
    }
}

/// One planned mutation of one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    /// Unique id within the plan
    pub id: ChangeId,
    /// Kind of mutation
    pub change_type: ChangeType,
    /// Target path (the new path for renames)
    pub path: PathBuf,
    /// Source path of a rename
    pub previous_path: Option<PathBuf>,
    /// Why the change is needed
    pub rationale: String,
    /// Reviewer-facing priority
    pub priority: Priority,
    /// Language tag used when extracting generated code
    pub language: Option<String>,
    /// Generated content
    pub new_content: Option<String>,
    /// Content before the change
    pub original_content: Option<String>,
    /// Change ids or target paths that must be applied first
    pub depends_on: Vec<String>,
    /// Current status
    pub status: ChangeStatus,
    /// Last error recorded against the change
    pub error: Option<String>,
    /// Set when the change was applied and later reverted
    pub rolled_back: bool,
}

impl FileChange {
    /// Creates a pending change
    pub fn new(
        id: ChangeId,
        change_type: ChangeType,
        path: impl Into<PathBuf>,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            id,
            change_type,
            path: path.into(),
            previous_path: None,
            rationale: rationale.into(),
            priority: Priority::default(),
            language: None,
            new_content: None,
            original_content: None,
            depends_on: Vec::new(),
            status: ChangeStatus::Pending,
            error: None,
            rolled_back: false,
        }
    }

    /// Sets the source path of a rename
    pub fn with_previous_path(mut self, previous: impl Into<PathBuf>) -> Self {
        self.previous_path = Some(previous.into());
        self
    }

    /// Sets the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the language tag
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Adds a dependency on another change, by id or by target path
    pub fn depends_on(mut self, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        if !self.depends_on.contains(&reference) {
            self.depends_on.push(reference);
        }
        self
    }

    /// Path whose current content this change starts from
    pub fn source_path(&self) -> Option<&Path> {
        match self.change_type {
            ChangeType::Create => None,
            ChangeType::Modify | ChangeType::Delete => Some(&self.path),
            ChangeType::Rename => self.previous_path.as_deref(),
        }
    }

    /// Moves to `next`, returning the previous status
    ///
    /// A disallowed transition leaves the status unchanged.
    pub fn transition(&mut self, next: ChangeStatus) -> Result<ChangeStatus> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(RefactorError::InvalidTransition {
                change_id: self.id.clone(),
                from,
                to: next,
            });
        }
        self.status = next;
        Ok(from)
    }

    /// Whether applying the change would alter the filesystem
    pub fn has_changes(&self) -> bool {
        match self.change_type {
            ChangeType::Create | ChangeType::Delete => true,
            ChangeType::Rename => {
                self.previous_path.as_deref() != Some(self.path.as_path())
                    || self.original_content != self.new_content
            }
            ChangeType::Modify => self.original_content != self.new_content,
        }
    }

    /// Whether the change has reached a final status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Why a candidate file was left out of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Extension is not in the allow-list
    UnsupportedExtension,
    /// File exceeds the size ceiling
    TooLarge {
        /// Size in bytes
        size: u64,
        /// Configured ceiling
        max_bytes: u64,
    },
    /// File does not exist
    Missing,
    /// File could not be read
    Unreadable {
        /// Underlying error
        message: String,
    },
}

/// A candidate dropped during filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedFile {
    /// Candidate path
    pub path: PathBuf,
    /// Why it was dropped
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modify(path: &str) -> FileChange {
        FileChange::new(ChangeId::numbered(1), ChangeType::Modify, path, "test")
    }

    #[test]
    fn test_change_type_parse_is_case_insensitive() {
        assert_eq!("MODIFY".parse::<ChangeType>().unwrap(), ChangeType::Modify);
        assert_eq!(" Rename ".parse::<ChangeType>().unwrap(), ChangeType::Rename);
        assert!("transmogrify".parse::<ChangeType>().is_err());
    }

    #[test]
    fn test_change_type_rank_order() {
        assert!(ChangeType::Create.rank() < ChangeType::Modify.rank());
        assert!(ChangeType::Modify.rank() < ChangeType::Delete.rank());
        assert!(ChangeType::Delete.rank() < ChangeType::Rename.rank());
    }

    #[test]
    fn test_change_type_serializes_lowercase() {
        let json = serde_json::to_string(&ChangeType::Delete).unwrap();
        assert_eq!(json, "\"delete\"");
    }

    #[test]
    fn test_priority_parse_lenient() {
        assert_eq!(Priority::parse_lenient("HIGH"), Priority::High);
        assert_eq!(Priority::parse_lenient("low"), Priority::Low);
        assert_eq!(Priority::parse_lenient("whenever"), Priority::Medium);
    }

    #[test]
    fn test_allowed_transitions() {
        let mut change = modify("a.py");
        assert_eq!(change.transition(ChangeStatus::Generating).unwrap(), ChangeStatus::Pending);
        change.transition(ChangeStatus::Ready).unwrap();
        change.transition(ChangeStatus::Applying).unwrap();
        change.transition(ChangeStatus::Applied).unwrap();
        assert!(change.is_terminal());
    }

    #[test]
    fn test_backward_transition_rejected() {
        let mut change = modify("a.py");
        change.transition(ChangeStatus::Ready).unwrap();

        let err = change.transition(ChangeStatus::Pending).unwrap_err();
        assert!(matches!(err, RefactorError::InvalidTransition { .. }));
        assert_eq!(change.status, ChangeStatus::Ready);
    }

    #[test]
    fn test_terminal_status_is_final() {
        for terminal in [ChangeStatus::Applied, ChangeStatus::Failed, ChangeStatus::Skipped] {
            for next in [
                ChangeStatus::Pending,
                ChangeStatus::Generating,
                ChangeStatus::Ready,
                ChangeStatus::Applying,
                ChangeStatus::Applied,
                ChangeStatus::Failed,
                ChangeStatus::Skipped,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_plan_status_transitions() {
        assert!(PlanStatus::Planned.can_transition_to(PlanStatus::DryRun));
        assert!(PlanStatus::AwaitingConfirmation.can_transition_to(PlanStatus::Planned));
        assert!(PlanStatus::Applying.can_transition_to(PlanStatus::RolledBack));
        assert!(!PlanStatus::Completed.can_transition_to(PlanStatus::Applying));
        assert!(!PlanStatus::Planned.can_transition_to(PlanStatus::Applying));
    }

    #[test]
    fn test_has_changes() {
        let mut change = modify("a.py");
        change.original_content = Some("same".to_string());
        change.new_content = Some("same".to_string());
        assert!(!change.has_changes());

        change.new_content = Some("different".to_string());
        assert!(change.has_changes());

        let delete = FileChange::new(ChangeId::numbered(2), ChangeType::Delete, "b.py", "unused");
        assert!(delete.has_changes());

        let create = FileChange::new(ChangeId::numbered(3), ChangeType::Create, "c.py", "new");
        assert!(create.has_changes());
    }

    #[test]
    fn test_source_path() {
        let rename = FileChange::new(ChangeId::numbered(1), ChangeType::Rename, "b.py", "move")
            .with_previous_path("a.py");
        assert_eq!(rename.source_path(), Some(Path::new("a.py")));

        let create = FileChange::new(ChangeId::numbered(2), ChangeType::Create, "c.py", "new");
        assert_eq!(create.source_path(), None);
    }

    #[test]
    fn test_depends_on_deduplicates() {
        let change = modify("a.py").depends_on("b.py").depends_on("b.py");
        assert_eq!(change.depends_on, vec!["b.py".to_string()]);
    }
}
