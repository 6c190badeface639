//! Turns an instruction and a candidate file set into a change plan

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use codeshift_files::FileSystem;
use serde_json::{Map, Value};

use crate::config::RefactorConfig;
use crate::error::{RefactorError, Result};
use crate::extract::{parse_json_response, ParseOutcome};
use crate::plan::ChangePlan;
use crate::prompts::{analysis_prompt, PromptFile, ANALYSIS_SYSTEM_PROMPT};
use crate::providers::{gather_context, SearchHit, SemanticSearch, TextGenerator};
use crate::types::{
    ChangeStatus, ChangeType, ExcludedFile, ExclusionReason, FileChange, PlanStatus, Priority,
};

const NO_CHANGE_MARKERS: &[&str] = &["none", "no change", "no_change", "no-change", "unchanged"];

/// A candidate that passed filtering
#[derive(Debug, Clone)]
struct AnalyzedFile {
    path: PathBuf,
    language: Option<String>,
    content: String,
}

impl AnalyzedFile {
    fn prompt_cost(&self) -> usize {
        self.content.len() + self.path.as_os_str().len()
    }
}

/// Builds change plans by asking a [`TextGenerator`] which files must change
///
/// Candidates are filtered by extension and size, split into batches that
/// fit the context budget and analysed one batch per call. A batch whose
/// response cannot be parsed does not abort the plan; each of its files is
/// recorded as a skipped change instead.
pub struct RefactorAnalyzer {
    fs: Arc<dyn FileSystem>,
    generator: Arc<dyn TextGenerator>,
    search: Option<Arc<dyn SemanticSearch>>,
}

impl RefactorAnalyzer {
    /// Creates an analyzer reading files through `fs`
    pub fn new(fs: Arc<dyn FileSystem>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            fs,
            generator,
            search: None,
        }
    }

    /// Adds semantic search for cross-file context
    pub fn with_search(mut self, search: Arc<dyn SemanticSearch>) -> Self {
        self.search = Some(search);
        self
    }

    /// Analyzes `candidates` against `instruction`
    ///
    /// # Errors
    ///
    /// - [`RefactorError::TooManyFiles`] if more than `max_files` candidates
    ///   survive filtering. No generation call is made.
    /// - [`RefactorError::PlanConflict`] or [`RefactorError::FileTooLarge`]
    ///   if the resulting plan fails validation.
    pub async fn analyze(
        &self,
        instruction: &str,
        candidates: &[PathBuf],
        config: &RefactorConfig,
    ) -> Result<ChangePlan> {
        config.validate()?;
        let mut plan = ChangePlan::new(instruction, config);
        tracing::info!(
            plan_id = %plan.id,
            candidates = candidates.len(),
            "Analyzing refactoring request"
        );

        let files = self.filter_candidates(&mut plan, candidates, config).await;

        if files.len() > config.max_files {
            return Err(RefactorError::TooManyFiles {
                count: files.len(),
                max_files: config.max_files,
            });
        }

        if files.is_empty() {
            plan.summary = "No files to analyze".to_string();
            plan.transition(PlanStatus::Planned)?;
            return Ok(plan);
        }

        let hits = gather_context(self.search.as_ref(), instruction, config.search_results).await;
        let batches = batch_by_budget(files, config.context_budget_bytes);
        let mut summaries = Vec::new();
        let mut parsed_batches = 0;

        for (index, batch) in batches.iter().enumerate() {
            tracing::debug!(plan_id = %plan.id, batch = index, files = batch.len(), "Analyzing batch");

            match self.analyze_batch(instruction, batch, &hits).await {
                Ok(analysis) => {
                    parsed_batches += 1;
                    merge_analysis(&mut plan, &analysis, config, &mut summaries);
                }
                Err(e) => {
                    tracing::warn!(
                        plan_id = %plan.id,
                        batch = index,
                        error = %e,
                        "Batch analysis failed, skipping its files"
                    );
                    for file in batch {
                        add_skipped(&mut plan, &file.path, ChangeType::Modify, config, &e);
                    }
                }
            }
        }

        plan.summary = if parsed_batches == 0 {
            "Could not parse analysis response".to_string()
        } else {
            summaries.join(" ")
        };

        plan.validate(self.fs.as_ref()).await?;
        plan.transition(PlanStatus::Planned)?;

        tracing::info!(
            plan_id = %plan.id,
            changes = plan.changes.len(),
            excluded = plan.excluded.len(),
            "Plan created"
        );
        Ok(plan)
    }

    async fn filter_candidates(
        &self,
        plan: &mut ChangePlan,
        candidates: &[PathBuf],
        config: &RefactorConfig,
    ) -> Vec<AnalyzedFile> {
        let mut seen: HashSet<&Path> = HashSet::new();
        let mut files = Vec::new();

        for path in candidates {
            if !seen.insert(path.as_path()) {
                continue;
            }

            if !config.is_allowed(path) {
                tracing::debug!(path = ?path, "Skipping unsupported extension");
                plan.excluded.push(ExcludedFile {
                    path: path.clone(),
                    reason: ExclusionReason::UnsupportedExtension,
                });
                continue;
            }

            let bytes = match self.fs.read(path).await {
                Ok(bytes) => bytes,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(path = ?path, "Skipping missing candidate");
                    plan.excluded.push(ExcludedFile {
                        path: path.clone(),
                        reason: ExclusionReason::Missing,
                    });
                    continue;
                }
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Skipping unreadable candidate");
                    plan.excluded.push(ExcludedFile {
                        path: path.clone(),
                        reason: ExclusionReason::Unreadable {
                            message: e.to_string(),
                        },
                    });
                    continue;
                }
            };

            let size = bytes.len() as u64;
            if size > config.max_file_size_bytes {
                tracing::warn!(
                    path = ?path,
                    size,
                    max_bytes = config.max_file_size_bytes,
                    "Skipping oversized file"
                );
                plan.excluded.push(ExcludedFile {
                    path: path.clone(),
                    reason: ExclusionReason::TooLarge {
                        size,
                        max_bytes: config.max_file_size_bytes,
                    },
                });
                continue;
            }

            files.push(AnalyzedFile {
                path: path.clone(),
                language: config.language_for(path),
                content: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        files
    }

    async fn analyze_batch(
        &self,
        instruction: &str,
        batch: &[AnalyzedFile],
        hits: &[SearchHit],
    ) -> Result<Map<String, Value>> {
        let prompt_files: Vec<PromptFile<'_>> = batch
            .iter()
            .map(|file| PromptFile {
                path: &file.path,
                language: file.language.as_deref(),
                content: &file.content,
            })
            .collect();
        let prompt = analysis_prompt(instruction, &prompt_files, hits);

        let response = self.generator.invoke(ANALYSIS_SYSTEM_PROMPT, &prompt).await?;

        match parse_json_response(&response) {
            ParseOutcome::Parsed(Value::Object(map)) => Ok(map),
            ParseOutcome::Parsed(_) => Err(RefactorError::AnalysisParse(
                "expected a JSON object".to_string(),
            )),
            ParseOutcome::Unparsed(reason) => Err(RefactorError::AnalysisParse(reason)),
        }
    }
}

/// Splits files into batches whose combined size stays within `budget`
///
/// A file larger than the budget gets a batch of its own.
fn batch_by_budget(files: Vec<AnalyzedFile>, budget: usize) -> Vec<Vec<AnalyzedFile>> {
    let mut batches = Vec::new();
    let mut current: Vec<AnalyzedFile> = Vec::new();
    let mut used = 0;

    for file in files {
        let cost = file.prompt_cost();
        if !current.is_empty() && used + cost > budget {
            batches.push(std::mem::take(&mut current));
            used = 0;
        }
        used += cost;
        current.push(file);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn merge_analysis(
    plan: &mut ChangePlan,
    analysis: &Map<String, Value>,
    config: &RefactorConfig,
    summaries: &mut Vec<String>,
) {
    if let Some(summary) = str_field(analysis, &["summary"]) {
        if !summary.is_empty() {
            summaries.push(summary.to_string());
        }
    }

    if let Some(complexity) = str_field(analysis, &["estimated_complexity", "complexity"]) {
        let replace = match &plan.complexity {
            Some(current) => complexity_rank(complexity) > complexity_rank(current),
            None => true,
        };
        if replace {
            plan.complexity = Some(complexity.to_ascii_lowercase());
        }
    }

    if let Some(risks) = analysis.get("risks").and_then(Value::as_array) {
        for risk in risks.iter().filter_map(Value::as_str) {
            if !plan.risks.iter().any(|r| r == risk) {
                plan.risks.push(risk.to_string());
            }
        }
    }

    let entries = analysis
        .get("affected_files")
        .or_else(|| analysis.get("changes"))
        .and_then(Value::as_array);

    for entry in entries.into_iter().flatten() {
        let Some(entry) = entry.as_object() else {
            continue;
        };
        let Some(path) = str_field(entry, &["file_path", "path"]) else {
            tracing::warn!(plan_id = %plan.id, "Ignoring analysis entry without a path");
            continue;
        };
        let path = PathBuf::from(path);

        let raw_type = str_field(entry, &["change_type", "type"]).unwrap_or("modify");
        if NO_CHANGE_MARKERS.contains(&raw_type.trim().to_ascii_lowercase().as_str()) {
            continue;
        }

        let change_type = match raw_type.parse::<ChangeType>() {
            Ok(change_type) => change_type,
            Err(message) => {
                tracing::warn!(plan_id = %plan.id, path = ?path, "Unknown change type in analysis");
                add_skipped(
                    plan,
                    &path,
                    ChangeType::Modify,
                    config,
                    &RefactorError::AnalysisParse(message),
                );
                continue;
            }
        };

        let rationale = str_field(entry, &["description", "rationale", "reason"]).unwrap_or("");
        let mut change = FileChange::new(plan.next_change_id(), change_type, &path, rationale)
            .with_priority(
                str_field(entry, &["priority"])
                    .map(Priority::parse_lenient)
                    .unwrap_or_default(),
            );
        change.language = config.language_for(&path);
        if let Some(previous) = str_field(entry, &["previous_path", "old_path", "from"]) {
            change.previous_path = Some(PathBuf::from(previous));
        }
        if let Some(deps) = entry.get("depends_on").and_then(Value::as_array) {
            for dep in deps.iter().filter_map(Value::as_str) {
                change = change.depends_on(dep);
            }
        }

        plan.add_change(change);
    }
}

fn add_skipped(
    plan: &mut ChangePlan,
    path: &Path,
    change_type: ChangeType,
    config: &RefactorConfig,
    error: &RefactorError,
) {
    let mut change = FileChange::new(
        plan.next_change_id(),
        change_type,
        path,
        "Analysis unavailable",
    );
    change.language = config.language_for(path);
    change.status = ChangeStatus::Skipped;
    change.error = Some(error.to_string());
    plan.add_change(change);
}

fn str_field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
}

fn complexity_rank(level: &str) -> u8 {
    match level.trim().to_ascii_lowercase().as_str() {
        "low" => 1,
        "medium" => 2,
        "high" => 3,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::types::ChangeId;
    use async_trait::async_trait;
    use codeshift_files::MemoryFileSystem;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays responses in order and counts calls
    struct Scripted {
        responses: Mutex<Vec<std::result::Result<String, ProviderError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(responses: Vec<std::result::Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn invoke(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
        ) -> std::result::Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(ProviderError::Other("no scripted response".to_string()))
            } else {
                responses.remove(0)
            }
        }
    }

    fn fs_with(files: &[(&str, &str)]) -> Arc<MemoryFileSystem> {
        Arc::new(MemoryFileSystem::with_files(
            files.iter().map(|(p, c)| (p.to_string(), c.to_string())),
        ))
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    const TYPE_HINTS: &str = r#"```json
{
  "summary": "Add type hints to functions",
  "affected_files": [
    {"file_path": "main.py", "change_type": "modify", "description": "Add type hints", "priority": "high"},
    {"file_path": "util.py", "change_type": "none", "description": "Already typed"}
  ],
  "risks": ["May break compatibility"],
  "estimated_complexity": "medium"
}
```"#;

    #[tokio::test]
    async fn test_analyze_builds_plan() {
        let fs = fs_with(&[("main.py", "def f(x):\n    return x\n"), ("util.py", "X = 1\n")]);
        let generator = Scripted::new(vec![Ok(TYPE_HINTS.to_string())]);
        let analyzer = RefactorAnalyzer::new(fs, generator.clone());

        let plan = analyzer
            .analyze("Add type hints", &paths(&["main.py", "util.py"]), &RefactorConfig::default())
            .await
            .unwrap();

        assert_eq!(plan.status, PlanStatus::Planned);
        assert_eq!(plan.summary, "Add type hints to functions");
        assert_eq!(plan.complexity.as_deref(), Some("medium"));
        assert_eq!(plan.risks, vec!["May break compatibility"]);
        assert_eq!(plan.changes.len(), 1);

        let change = &plan.changes[0];
        assert_eq!(change.id, ChangeId::numbered(1));
        assert_eq!(change.path, PathBuf::from("main.py"));
        assert_eq!(change.change_type, ChangeType::Modify);
        assert_eq!(change.priority, Priority::High);
        assert_eq!(change.language.as_deref(), Some("python"));
        assert!(change.new_content.is_none());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_analyze_no_files() {
        let generator = Scripted::new(Vec::new());
        let analyzer = RefactorAnalyzer::new(fs_with(&[]), generator.clone());

        let plan = analyzer
            .analyze("Add type hints", &[], &RefactorConfig::default())
            .await
            .unwrap();

        assert_eq!(plan.summary, "No files to analyze");
        assert!(plan.changes.is_empty());
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_filtering_records_exclusions() {
        let fs = fs_with(&[("a.py", "x = 1\n"), ("big.py", &"x".repeat(64)), ("notes.bin", "..")]);
        let generator = Scripted::new(vec![Ok("{\"summary\": \"ok\", \"affected_files\": []}".to_string())]);
        let analyzer = RefactorAnalyzer::new(fs, generator);
        let config = RefactorConfig {
            max_file_size_bytes: 32,
            ..Default::default()
        };

        let plan = analyzer
            .analyze("x", &paths(&["a.py", "big.py", "notes.bin", "gone.py"]), &config)
            .await
            .unwrap();

        let reasons: Vec<_> = plan.excluded.iter().map(|e| (e.path.clone(), e.reason.clone())).collect();
        assert_eq!(
            reasons,
            vec![
                (PathBuf::from("big.py"), ExclusionReason::TooLarge { size: 64, max_bytes: 32 }),
                (PathBuf::from("notes.bin"), ExclusionReason::UnsupportedExtension),
                (PathBuf::from("gone.py"), ExclusionReason::Missing),
            ]
        );
    }

    #[tokio::test]
    async fn test_too_many_files_makes_no_calls() {
        let fs = fs_with(&[("a.py", "a"), ("b.py", "b"), ("c.py", "c")]);
        let generator = Scripted::new(Vec::new());
        let analyzer = RefactorAnalyzer::new(fs, generator.clone());
        let config = RefactorConfig {
            max_files: 2,
            ..Default::default()
        };

        let result = analyzer
            .analyze("x", &paths(&["a.py", "b.py", "c.py"]), &config)
            .await;

        assert!(matches!(
            result,
            Err(RefactorError::TooManyFiles { count: 3, max_files: 2 })
        ));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unparsable_batch_skips_its_files() {
        let fs = fs_with(&[("a.py", "a = 1\n"), ("b.py", "b = 2\n")]);
        let generator = Scripted::new(vec![
            Ok(r#"{"summary": "first", "affected_files": [{"file_path": "a.py", "change_type": "modify"}]}"#.to_string()),
            Ok("I am not sure what to do here".to_string()),
        ]);
        let analyzer = RefactorAnalyzer::new(fs, generator.clone());
        // Each file gets its own batch
        let config = RefactorConfig {
            context_budget_bytes: 8,
            ..Default::default()
        };

        let plan = analyzer
            .analyze("x", &paths(&["a.py", "b.py"]), &config)
            .await
            .unwrap();

        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(plan.summary, "first");
        assert_eq!(plan.changes.len(), 2);
        assert_eq!(plan.changes[0].status, ChangeStatus::Pending);
        assert_eq!(plan.changes[1].path, PathBuf::from("b.py"));
        assert_eq!(plan.changes[1].status, ChangeStatus::Skipped);
        assert!(plan.changes[1].error.as_deref().unwrap().contains("Could not parse"));
    }

    #[tokio::test]
    async fn test_provider_failure_degrades_batch() {
        let fs = fs_with(&[("a.py", "a = 1\n")]);
        let generator = Scripted::new(vec![Err(ProviderError::Unavailable("offline".to_string()))]);
        let analyzer = RefactorAnalyzer::new(fs, generator);

        let plan = analyzer
            .analyze("x", &paths(&["a.py"]), &RefactorConfig::default())
            .await
            .unwrap();

        assert_eq!(plan.summary, "Could not parse analysis response");
        assert_eq!(plan.changes[0].status, ChangeStatus::Skipped);
    }

    #[tokio::test]
    async fn test_rename_delete_conflict_rejected() {
        let fs = fs_with(&[("a.py", "a = 1\n")]);
        let response = r#"{"summary": "move", "affected_files": [
            {"file_path": "b.py", "change_type": "rename", "previous_path": "a.py"},
            {"file_path": "a.py", "change_type": "delete"}
        ]}"#;
        let analyzer = RefactorAnalyzer::new(fs, Scripted::new(vec![Ok(response.to_string())]));

        let result = analyzer
            .analyze("x", &paths(&["a.py"]), &RefactorConfig::default())
            .await;
        assert!(matches!(result, Err(RefactorError::PlanConflict(_))));
    }

    #[tokio::test]
    async fn test_unknown_change_type_is_skipped() {
        let fs = fs_with(&[("a.py", "a = 1\n")]);
        let response = r#"{"summary": "s", "affected_files": [{"file_path": "a.py", "change_type": "transmogrify"}]}"#;
        let analyzer = RefactorAnalyzer::new(fs, Scripted::new(vec![Ok(response.to_string())]));

        let plan = analyzer
            .analyze("x", &paths(&["a.py"]), &RefactorConfig::default())
            .await
            .unwrap();
        assert_eq!(plan.changes[0].status, ChangeStatus::Skipped);
    }

    #[tokio::test]
    async fn test_search_failure_is_silent() {
        struct Broken;

        #[async_trait]
        impl SemanticSearch for Broken {
            async fn search(
                &self,
                _query: &str,
                _k: usize,
            ) -> std::result::Result<Vec<SearchHit>, ProviderError> {
                Err(ProviderError::Unavailable("index missing".to_string()))
            }
        }

        let fs = fs_with(&[("a.py", "a = 1\n")]);
        let analyzer = RefactorAnalyzer::new(fs, Scripted::new(vec![Ok(TYPE_HINTS.to_string())]))
            .with_search(Arc::new(Broken));

        let plan = analyzer
            .analyze("x", &paths(&["a.py"]), &RefactorConfig::default())
            .await
            .unwrap();
        assert_eq!(plan.status, PlanStatus::Planned);
    }

    #[test]
    fn test_batch_by_budget() {
        let file = |name: &str, size: usize| AnalyzedFile {
            path: PathBuf::from(name),
            language: None,
            content: "x".repeat(size),
        };
        let batches = batch_by_budget(
            vec![file("a", 10), file("b", 10), file("c", 100), file("d", 5)],
            25,
        );
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
    }
}
