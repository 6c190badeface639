//! The change plan produced by analysis and consumed by the applier

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use codeshift_files::FileSystem;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::RefactorConfig;
use crate::error::{RefactorError, Result};
use crate::types::{ChangeId, ChangeStatus, ChangeType, ExcludedFile, FileChange, PlanStatus};

/// An ordered set of file changes derived from one instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePlan {
    /// Unique plan id
    pub id: String,
    /// Instruction the plan was derived from
    pub instruction: String,
    /// Summary of the planned work
    pub summary: String,
    /// Estimated complexity as reported by analysis
    pub complexity: Option<String>,
    /// Risks reported by analysis
    pub risks: Vec<String>,
    /// Planned changes, in application order once ordered
    pub changes: Vec<FileChange>,
    /// Extra `(before, after)` ordering constraints
    pub declared_edges: Vec<(ChangeId, ChangeId)>,
    /// Candidates dropped during filtering
    pub excluded: Vec<ExcludedFile>,
    /// Current status
    pub status: PlanStatus,
    /// Ceiling on the number of files
    pub max_files: usize,
    /// Ceiling on the size of a single source file
    pub max_file_size_bytes: u64,
}

impl ChangePlan {
    /// Creates an empty plan in the `Analyzing` state
    pub fn new(instruction: impl Into<String>, config: &RefactorConfig) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            instruction: instruction.into(),
            summary: String::new(),
            complexity: None,
            risks: Vec::new(),
            changes: Vec::new(),
            declared_edges: Vec::new(),
            excluded: Vec::new(),
            status: PlanStatus::Analyzing,
            max_files: config.max_files,
            max_file_size_bytes: config.max_file_size_bytes,
        }
    }

    /// Id for the next change added to the plan
    pub fn next_change_id(&self) -> ChangeId {
        ChangeId::numbered(self.changes.len() + 1)
    }

    /// Appends a change
    pub fn add_change(&mut self, change: FileChange) {
        self.changes.push(change);
    }

    /// Declares that `before` must be applied before `after`
    pub fn declare_edge(&mut self, before: ChangeId, after: ChangeId) {
        self.declared_edges.push((before, after));
    }

    /// Number of distinct files touched by the plan
    pub fn total_files(&self) -> usize {
        let mut paths: HashSet<&Path> = HashSet::new();
        for change in &self.changes {
            paths.insert(change.path.as_path());
            if let Some(previous) = &change.previous_path {
                paths.insert(previous.as_path());
            }
        }
        paths.len()
    }

    /// Changes of the given type, in plan order
    pub fn files_by_type(&self, change_type: ChangeType) -> Vec<&FileChange> {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .collect()
    }

    /// Looks up a change by id
    pub fn get(&self, id: &ChangeId) -> Option<&FileChange> {
        self.changes.iter().find(|c| &c.id == id)
    }

    /// Looks up a change by id for mutation
    pub fn get_mut(&mut self, id: &ChangeId) -> Option<&mut FileChange> {
        self.changes.iter_mut().find(|c| &c.id == id)
    }

    /// Moves the plan to `next`
    pub fn transition(&mut self, next: PlanStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RefactorError::InvalidState(format!(
                "plan {} cannot move from {:?} to {:?}",
                self.id, self.status, next
            )));
        }
        tracing::debug!(plan_id = %self.id, from = ?self.status, to = ?next, "Plan status changed");
        self.status = next;
        Ok(())
    }

    /// Checks the plan's structural invariants
    ///
    /// Target paths must be unique, every rename needs a source path that no
    /// other change targets or renames, and no non-skipped change may start
    /// from a file larger than the size ceiling.
    pub async fn validate(&self, fs: &dyn FileSystem) -> Result<()> {
        let mut targets: HashMap<&Path, &FileChange> = HashMap::new();
        for change in &self.changes {
            if let Some(other) = targets.insert(change.path.as_path(), change) {
                return Err(RefactorError::PlanConflict(format!(
                    "{} and {} both target {}",
                    other.id,
                    change.id,
                    change.path.display()
                )));
            }
        }

        let mut rename_sources: HashMap<&Path, &ChangeId> = HashMap::new();

        for change in &self.changes {
            match (change.change_type, &change.previous_path) {
                (ChangeType::Rename, None) => {
                    return Err(RefactorError::PlanConflict(format!(
                        "{} renames {} without a previous path",
                        change.id,
                        change.path.display()
                    )));
                }
                (ChangeType::Rename, Some(previous)) => {
                    let target = targets
                        .get(previous.as_path())
                        .filter(|other| other.id != change.id);
                    if let Some(other) = target {
                        let action = match other.change_type {
                            ChangeType::Delete => "deletes",
                            _ => "also targets",
                        };
                        return Err(RefactorError::PlanConflict(format!(
                            "{} renames {} which {} {}",
                            change.id,
                            previous.display(),
                            other.id,
                            action
                        )));
                    }
                    if let Some(other) = rename_sources.insert(previous.as_path(), &change.id) {
                        return Err(RefactorError::PlanConflict(format!(
                            "{} and {} both rename {}",
                            other,
                            change.id,
                            previous.display()
                        )));
                    }
                }
                (_, Some(previous)) => {
                    return Err(RefactorError::PlanConflict(format!(
                        "{} is a {} but names previous path {}",
                        change.id,
                        change.change_type,
                        previous.display()
                    )));
                }
                (_, None) => {}
            }
        }

        for change in &self.changes {
            if change.status == ChangeStatus::Skipped {
                continue;
            }
            if let Some(source) = change.source_path() {
                self.check_size(fs, source).await?;
            }
        }

        Ok(())
    }

    async fn check_size(&self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        let content = match fs.read(path).await {
            Ok(content) => content,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let size = content.len() as u64;
        if size > self.max_file_size_bytes {
            return Err(RefactorError::FileTooLarge {
                path: PathBuf::from(path),
                size,
                max_bytes: self.max_file_size_bytes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeshift_files::MemoryFileSystem;

    fn plan_with(changes: Vec<FileChange>) -> ChangePlan {
        let mut plan = ChangePlan::new("test", &RefactorConfig::default());
        for change in changes {
            plan.add_change(change);
        }
        plan
    }

    fn change(n: usize, change_type: ChangeType, path: &str) -> FileChange {
        FileChange::new(ChangeId::numbered(n), change_type, path, "test")
    }

    #[test]
    fn test_total_files_and_by_type() {
        let plan = plan_with(vec![
            change(1, ChangeType::Modify, "a.py"),
            change(2, ChangeType::Create, "b.py"),
            change(3, ChangeType::Delete, "c.py"),
            change(4, ChangeType::Rename, "e.py").with_previous_path("d.py"),
        ]);

        assert_eq!(plan.total_files(), 5);
        assert_eq!(plan.files_by_type(ChangeType::Modify).len(), 1);
        assert_eq!(plan.files_by_type(ChangeType::Rename).len(), 1);
        assert_eq!(plan.get(&ChangeId::numbered(3)).unwrap().path, PathBuf::from("c.py"));
        assert!(plan.get(&ChangeId::numbered(9)).is_none());
    }

    #[test]
    fn test_next_change_id_follows_discovery_order() {
        let mut plan = plan_with(vec![]);
        assert_eq!(plan.next_change_id().as_str(), "change-1");
        plan.add_change(change(1, ChangeType::Modify, "a.py"));
        assert_eq!(plan.next_change_id().as_str(), "change-2");
    }

    #[test]
    fn test_plan_transition_rejects_skipping_confirmation() {
        let mut plan = plan_with(vec![]);
        plan.transition(PlanStatus::Planned).unwrap();
        assert!(matches!(
            plan.transition(PlanStatus::Applying),
            Err(RefactorError::InvalidState(_))
        ));
        assert_eq!(plan.status, PlanStatus::Planned);
    }

    #[tokio::test]
    async fn test_validate_rename_of_deleted_path_conflicts() {
        let fs = MemoryFileSystem::with_files([("a.py", "x = 1\n")]);
        let plan = plan_with(vec![
            change(1, ChangeType::Rename, "b.py").with_previous_path("a.py"),
            change(2, ChangeType::Delete, "a.py"),
        ]);

        assert!(matches!(
            plan.validate(&fs).await,
            Err(RefactorError::PlanConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_duplicate_targets_conflict() {
        let fs = MemoryFileSystem::new();
        let plan = plan_with(vec![
            change(1, ChangeType::Modify, "a.py"),
            change(2, ChangeType::Delete, "a.py"),
        ]);

        assert!(matches!(
            plan.validate(&fs).await,
            Err(RefactorError::PlanConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_rename_of_modified_path_conflicts() {
        let fs = MemoryFileSystem::with_files([("a.py", "x = 1\n")]);
        let plan = plan_with(vec![
            change(1, ChangeType::Modify, "a.py"),
            change(2, ChangeType::Rename, "b.py").with_previous_path("a.py"),
        ]);

        match plan.validate(&fs).await {
            Err(RefactorError::PlanConflict(message)) => {
                assert!(message.contains("change-2"));
                assert!(message.contains("change-1"));
            }
            other => panic!("expected PlanConflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validate_rename_swap_conflicts() {
        let fs = MemoryFileSystem::with_files([("a.py", "a\n"), ("b.py", "b\n")]);
        let plan = plan_with(vec![
            change(1, ChangeType::Rename, "b.py").with_previous_path("a.py"),
            change(2, ChangeType::Rename, "a.py").with_previous_path("b.py"),
        ]);

        assert!(matches!(
            plan.validate(&fs).await,
            Err(RefactorError::PlanConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_rename_onto_created_source_conflicts() {
        let fs = MemoryFileSystem::new();
        let plan = plan_with(vec![
            change(1, ChangeType::Create, "a.py"),
            change(2, ChangeType::Rename, "b.py").with_previous_path("a.py"),
        ]);

        assert!(matches!(
            plan.validate(&fs).await,
            Err(RefactorError::PlanConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_double_rename_conflicts() {
        let fs = MemoryFileSystem::new();
        let plan = plan_with(vec![
            change(1, ChangeType::Rename, "b.py").with_previous_path("a.py"),
            change(2, ChangeType::Rename, "c.py").with_previous_path("a.py"),
        ]);

        assert!(matches!(
            plan.validate(&fs).await,
            Err(RefactorError::PlanConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_validate_previous_path_rules() {
        let fs = MemoryFileSystem::new();

        let missing = plan_with(vec![change(1, ChangeType::Rename, "b.py")]);
        assert!(missing.validate(&fs).await.is_err());

        let extra = plan_with(vec![change(1, ChangeType::Modify, "b.py").with_previous_path("a.py")]);
        assert!(extra.validate(&fs).await.is_err());
    }

    #[tokio::test]
    async fn test_validate_rejects_oversized_source() {
        let fs = MemoryFileSystem::with_files([("big.py", vec![b'x'; 64])]);
        let mut plan = plan_with(vec![change(1, ChangeType::Modify, "big.py")]);
        plan.max_file_size_bytes = 32;

        match plan.validate(&fs).await {
            Err(RefactorError::FileTooLarge { size, max_bytes, .. }) => {
                assert_eq!(size, 64);
                assert_eq!(max_bytes, 32);
            }
            other => panic!("expected FileTooLarge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validate_accepts_well_formed_plan() {
        let fs = MemoryFileSystem::with_files([("a.py", "x = 1\n"), ("c.py", "y = 2\n")]);
        let plan = plan_with(vec![
            change(1, ChangeType::Rename, "b.py").with_previous_path("a.py"),
            change(2, ChangeType::Delete, "c.py"),
            change(3, ChangeType::Create, "d.py"),
        ]);

        plan.validate(&fs).await.unwrap();
    }
}
