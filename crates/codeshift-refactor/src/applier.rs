//! Transactional application of change plans
//!
//! A run orders the plan, generates content level by level, previews every
//! change as a diff and then, unless it is a dry run or the confirmer
//! declines, writes the changes one at a time. Every path is snapshotted
//! before its first write. The first failure stops the run and restores the
//! snapshot; the plan then ends as `RolledBack`, or as `PartialFailure` if any
//! path could not be restored.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use codeshift_files::{
    Backup, BackupManager, ContentVerifier, DiffEngine, DiffResult, FileError, FileSystem,
    RestoreOutcome,
};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::RefactorConfig;
use crate::error::{RefactorError, Result};
use crate::generator::ContentGenerator;
use crate::orderer::DependencyOrderer;
use crate::plan::ChangePlan;
use crate::progress::{ProgressReporter, ProgressSender};
use crate::providers::{gather_context, AutoConfirm, Confirmer, SearchHit, SemanticSearch, TextGenerator};
use crate::result::{BackupSummary, RefactorResult, ResultError};
use crate::types::{ChangeId, ChangeStatus, ChangeType, FileChange, PlanStatus};

/// Options for a single apply run
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Preview only, never touch the filesystem
    pub dry_run: bool,
}

impl ApplyOptions {
    /// Options for a preview run
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }
}

/// Applies a [`ChangePlan`] with backup and rollback
pub struct TransactionalApplier {
    fs: Arc<dyn FileSystem>,
    generator: ContentGenerator,
    confirmer: Arc<dyn Confirmer>,
    search: Option<Arc<dyn SemanticSearch>>,
    config: RefactorConfig,
    reporter: ProgressReporter,
    cancel: CancellationToken,
    diff_engine: DiffEngine,
    verifier: ContentVerifier,
}

impl TransactionalApplier {
    /// Creates an applier that confirms automatically
    pub fn new(
        fs: Arc<dyn FileSystem>,
        generator: Arc<dyn TextGenerator>,
        config: RefactorConfig,
    ) -> Self {
        Self {
            fs,
            generator: ContentGenerator::new(generator),
            confirmer: Arc::new(AutoConfirm),
            search: None,
            config,
            reporter: ProgressReporter::default(),
            cancel: CancellationToken::new(),
            diff_engine: DiffEngine::new(),
            verifier: ContentVerifier::new(),
        }
    }

    /// Sets the collaborator asked before writing
    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    /// Adds semantic search context to generation prompts
    pub fn with_search(mut self, search: Arc<dyn SemanticSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Reports every change status transition on `sender`
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.reporter = ProgressReporter::new(Some(sender));
        self
    }

    /// Uses `token` to cancel the run between changes
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this applier's runs
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Applies `plan`
    ///
    /// # Errors
    ///
    /// Returns an error without side effects if the plan is not `Planned` or
    /// its dependency graph has a cycle. Failures after ordering are recorded
    /// in the returned [`RefactorResult`] instead.
    pub async fn apply(
        &self,
        plan: &mut ChangePlan,
        options: ApplyOptions,
    ) -> Result<RefactorResult> {
        if plan.status != PlanStatus::Planned {
            return Err(RefactorError::InvalidState(format!(
                "plan {} must be planned before applying, found {:?}",
                plan.id, plan.status
            )));
        }

        let ordered = DependencyOrderer::order(plan.changes.clone(), &plan.declared_edges)?;
        plan.changes = ordered;
        let levels = DependencyOrderer::levels(&plan.changes, &plan.declared_edges)?;

        tracing::info!(
            plan_id = %plan.id,
            changes = plan.changes.len(),
            levels = levels.len(),
            dry_run = options.dry_run,
            "Applying plan"
        );

        let mut errors = Vec::new();
        let hits = gather_context(
            self.search.as_ref(),
            &plan.instruction,
            self.config.search_results,
        )
        .await;

        let cancelled = self.generate_all(plan, &levels, &hits, &mut errors).await?;
        let diffs = self.preview(plan)?;

        if cancelled {
            tracing::info!(plan_id = %plan.id, "Run cancelled before any write");
            return Ok(RefactorResult::from_plan(plan, errors, diffs, None));
        }

        if options.dry_run {
            plan.transition(PlanStatus::DryRun)?;
            tracing::info!(plan_id = %plan.id, diffs = diffs.len(), "Dry run complete");
            return Ok(RefactorResult::from_plan(plan, errors, diffs, None));
        }

        plan.transition(PlanStatus::AwaitingConfirmation)?;
        if self.config.require_confirmation && !self.confirmer.confirm(plan, &diffs).await {
            plan.transition(PlanStatus::Planned)?;
            tracing::info!(plan_id = %plan.id, "Plan declined, nothing written");
            return Ok(RefactorResult::from_plan(plan, errors, diffs, None));
        }

        plan.transition(PlanStatus::Applying)?;
        self.write_all(plan, errors, diffs).await
    }

    /// Generates content for every pending change, one dependency level at a time
    ///
    /// Returns `true` if the run was cancelled.
    async fn generate_all(
        &self,
        plan: &mut ChangePlan,
        levels: &[Vec<ChangeId>],
        hits: &[SearchHit],
        errors: &mut Vec<ResultError>,
    ) -> Result<bool> {
        let instruction = plan.instruction.clone();

        for level in levels {
            if self.cancel.is_cancelled() {
                self.cancel_remaining(plan, errors)?;
                return Ok(true);
            }

            let mut jobs = Vec::new();
            for id in level {
                let Some(index) = plan.changes.iter().position(|c| &c.id == id) else {
                    continue;
                };
                let change = &mut plan.changes[index];
                if change.status != ChangeStatus::Pending {
                    continue;
                }

                if let Err(e) = self.capture_original(change).await {
                    self.fail(change, &e, errors)?;
                    continue;
                }

                if change.change_type == ChangeType::Delete {
                    self.reporter.transition(change, ChangeStatus::Ready)?;
                } else {
                    self.reporter.transition(change, ChangeStatus::Generating)?;
                    jobs.push((index, change.clone()));
                }
            }

            let results: Vec<(usize, Result<String>)> = stream::iter(jobs)
                .map(|(index, change)| {
                    let instruction = instruction.as_str();
                    async move {
                        if self.cancel.is_cancelled() {
                            return (index, Err(RefactorError::Cancelled(change.id.clone())));
                        }
                        let generated = self
                            .generator
                            .generate(&change, instruction, change.original_content.as_deref(), hits)
                            .await;
                        (index, generated)
                    }
                })
                .buffer_unordered(self.config.generation_concurrency.max(1))
                .collect()
                .await;

            let mut cancelled = false;
            for (index, generated) in results {
                let change = &mut plan.changes[index];
                match generated {
                    Ok(content) => {
                        change.new_content = Some(content);
                        self.reporter.transition(change, ChangeStatus::Ready)?;
                    }
                    Err(RefactorError::Cancelled(_)) => {
                        self.reporter.transition(change, ChangeStatus::Skipped)?;
                        cancelled = true;
                    }
                    Err(e) => {
                        tracing::warn!(change_id = %change.id, error = %e, "Generation failed");
                        self.fail(change, &e, errors)?;
                    }
                }
            }

            if cancelled {
                self.cancel_remaining(plan, errors)?;
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn capture_original(&self, change: &mut FileChange) -> Result<()> {
        if change.original_content.is_some() {
            return Ok(());
        }
        if let Some(source) = change.source_path() {
            let content = self.fs.read_to_string(source).await?;
            change.original_content = Some(content);
        }
        Ok(())
    }

    /// Diffs every ready change; changes that would not alter anything are skipped
    fn preview(&self, plan: &mut ChangePlan) -> Result<Vec<DiffResult>> {
        let mut diffs = Vec::new();

        for change in plan.changes.iter_mut() {
            if change.status != ChangeStatus::Ready {
                continue;
            }
            if !change.has_changes() {
                tracing::debug!(change_id = %change.id, "Generated content is unchanged");
                self.reporter.transition(change, ChangeStatus::Skipped)?;
                continue;
            }

            let old = change.original_content.as_deref().unwrap_or("");
            let new = match change.change_type {
                ChangeType::Delete => "",
                _ => change.new_content.as_deref().unwrap_or(""),
            };
            diffs.push(self.diff_engine.diff_file(&change.path, old, new));
        }

        Ok(diffs)
    }

    async fn write_all(
        &self,
        plan: &mut ChangePlan,
        mut errors: Vec<ResultError>,
        diffs: Vec<DiffResult>,
    ) -> Result<RefactorResult> {
        let manager = BackupManager::new(self.fs.clone(), self.config.backup_dir.clone());
        let mut backup = self.config.create_backup.then(|| manager.begin_backup());
        let mut halted = false;

        for index in 0..plan.changes.len() {
            if self.cancel.is_cancelled() {
                let id = plan.changes[index].id.clone();
                tracing::info!(plan_id = %plan.id, change_id = %id, "Run cancelled");
                errors.push(ResultError::from_error(&RefactorError::Cancelled(id)));
                halted = true;
                break;
            }

            let change = &mut plan.changes[index];
            match change.status {
                ChangeStatus::Ready => {}
                ChangeStatus::Failed => {
                    tracing::warn!(change_id = %change.id, "Halting at failed change");
                    halted = true;
                    break;
                }
                _ => continue,
            }

            if let Err(e) = self.apply_change(change, &manager, backup.as_mut()).await {
                tracing::warn!(change_id = %change.id, error = %e, "Failed to apply change");
                self.fail(change, &e, &mut errors)?;
                halted = true;
                break;
            }
        }

        if halted {
            return self.roll_back(plan, &manager, backup, errors, diffs).await;
        }

        plan.transition(PlanStatus::Completed)?;
        let summary = match backup {
            Some(backup) => Some(self.finish_backup(&manager, backup).await),
            None => None,
        };

        tracing::info!(plan_id = %plan.id, "Plan applied");
        Ok(RefactorResult::from_plan(plan, errors, diffs, summary))
    }

    /// Snapshots, writes and verifies one change
    async fn apply_change(
        &self,
        change: &mut FileChange,
        manager: &BackupManager,
        backup: Option<&mut Backup>,
    ) -> Result<()> {
        self.reporter.transition(change, ChangeStatus::Applying)?;

        if let Some(backup) = backup {
            manager.snapshot(backup, &change.path).await?;
            if let Some(previous) = &change.previous_path {
                manager.snapshot(backup, previous).await?;
            }
        }

        let id = change.id.clone();
        match change.change_type {
            ChangeType::Create | ChangeType::Modify => {
                let content = new_content(change)?;
                self.write_verified(&id, &change.path, content.as_bytes())
                    .await?;
            }
            ChangeType::Delete => {
                self.remove_verified(&id, &change.path).await?;
            }
            ChangeType::Rename => {
                let content = new_content(change)?;
                let previous = change.previous_path.clone().ok_or_else(|| {
                    RefactorError::InvalidState(format!("{} has no previous path", id))
                })?;
                self.write_verified(&id, &change.path, content.as_bytes())
                    .await?;
                if previous != change.path {
                    self.remove_verified(&id, &previous).await?;
                }
            }
        }

        self.reporter.transition(change, ChangeStatus::Applied)?;
        tracing::debug!(change_id = %change.id, path = ?change.path, "Change applied");
        Ok(())
    }

    async fn write_verified(&self, id: &ChangeId, path: &Path, content: &[u8]) -> Result<()> {
        self.fs
            .write(path, content)
            .await
            .map_err(|e| apply_io(id, path, e))?;
        self.verifier
            .verify_write(self.fs.as_ref(), path, content)
            .await
            .map_err(|e| apply_io(id, path, e))
    }

    async fn remove_verified(&self, id: &ChangeId, path: &Path) -> Result<()> {
        self.fs.delete(path).await.map_err(|e| apply_io(id, path, e))?;
        self.verifier
            .verify_removed(self.fs.as_ref(), path)
            .await
            .map_err(|e| apply_io(id, path, e))
    }

    /// Restores the backup after a halt
    async fn roll_back(
        &self,
        plan: &mut ChangePlan,
        manager: &BackupManager,
        backup: Option<Backup>,
        mut errors: Vec<ResultError>,
        diffs: Vec<DiffResult>,
    ) -> Result<RefactorResult> {
        for change in plan.changes.iter_mut() {
            if matches!(change.status, ChangeStatus::Pending | ChangeStatus::Ready) {
                self.reporter.transition(change, ChangeStatus::Skipped)?;
            }
        }

        let Some(backup) = backup else {
            tracing::error!(plan_id = %plan.id, "Run failed without a backup, changes left in place");
            plan.transition(PlanStatus::PartialFailure)?;
            return Ok(RefactorResult::from_plan(plan, errors, diffs, None));
        };

        let outcomes = manager.restore(&backup).await;
        let mut unrestored: HashSet<PathBuf> = HashSet::new();
        for outcome in outcomes {
            if let RestoreOutcome::Failed { path, error } = outcome {
                errors.push(ResultError::from_error(&RefactorError::RestoreIo {
                    path: path.clone(),
                    message: error,
                }));
                unrestored.insert(path);
            }
        }

        for change in plan.changes.iter_mut() {
            if change.status == ChangeStatus::Applied {
                let touched = [Some(change.path.as_path()), change.previous_path.as_deref()];
                change.rolled_back = touched
                    .iter()
                    .flatten()
                    .all(|path| !unrestored.contains(*path));
            }
        }

        let status = if unrestored.is_empty() {
            PlanStatus::RolledBack
        } else {
            PlanStatus::PartialFailure
        };
        plan.transition(status)?;
        tracing::info!(
            plan_id = %plan.id,
            status = ?status,
            unrestored = unrestored.len(),
            "Rollback finished"
        );

        let summary = BackupSummary::from_backup(&backup, true);
        Ok(RefactorResult::from_plan(plan, errors, diffs, Some(summary)))
    }

    async fn finish_backup(&self, manager: &BackupManager, backup: Backup) -> BackupSummary {
        if self.config.keep_backup {
            return BackupSummary::from_backup(&backup, true);
        }

        let summary = BackupSummary::from_backup(&backup, false);
        match manager.discard(backup).await {
            Ok(()) => summary,
            Err(e) => {
                tracing::warn!(backup_id = %summary.id, error = %e, "Failed to discard backup");
                BackupSummary {
                    retained: true,
                    ..summary
                }
            }
        }
    }

    /// Marks every change that has not started as skipped after a cancellation
    fn cancel_remaining(&self, plan: &mut ChangePlan, errors: &mut Vec<ResultError>) -> Result<()> {
        let mut first = None;
        for change in plan.changes.iter_mut() {
            if matches!(
                change.status,
                ChangeStatus::Pending | ChangeStatus::Generating | ChangeStatus::Ready
            ) {
                first.get_or_insert_with(|| change.id.clone());
                self.reporter.transition(change, ChangeStatus::Skipped)?;
            }
        }

        if let Some(id) = first {
            errors.push(ResultError::from_error(&RefactorError::Cancelled(id)));
        }
        Ok(())
    }

    fn fail(
        &self,
        change: &mut FileChange,
        error: &RefactorError,
        errors: &mut Vec<ResultError>,
    ) -> Result<()> {
        change.error = Some(error.to_string());
        errors.push(ResultError::from_error(error).for_change(&change.id));
        if !change.is_terminal() {
            self.reporter.transition(change, ChangeStatus::Failed)?;
        }
        Ok(())
    }
}

fn new_content(change: &FileChange) -> Result<String> {
    change.new_content.clone().ok_or_else(|| {
        RefactorError::InvalidState(format!("{} has no generated content", change.id))
    })
}

fn apply_io(change_id: &ChangeId, path: &Path, err: FileError) -> RefactorError {
    RefactorError::ApplyIo {
        change_id: change_id.clone(),
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
