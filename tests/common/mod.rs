//! Shared fixtures for the integration scenarios

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use codeshift_files::{DiffResult, FileError, FileSystem, MemoryFileSystem};
use codeshift_refactor::prompts::ANALYSIS_SYSTEM_PROMPT;
use codeshift_refactor::{ChangePlan, Confirmer, ProviderError, TextGenerator};
use tokio_util::sync::CancellationToken;

/// Routes test logs through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Generator with queued analysis responses and per-path generation responses
///
/// Generation prompts are matched by the backticked target path they name.
/// A path with no response, or one registered with [`StubGenerator::refuse`],
/// gets an answer without any code block.
#[derive(Default)]
pub struct StubGenerator {
    analyses: Mutex<VecDeque<Result<String, ProviderError>>>,
    files: Mutex<Vec<(String, String)>>,
    analysis_calls: AtomicUsize,
    generation_calls: AtomicUsize,
}

impl StubGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_analysis(self, response: impl Into<String>) -> Self {
        self.analyses
            .lock()
            .unwrap()
            .push_back(Ok(response.into()));
        self
    }

    pub fn with_failed_analysis(self, error: ProviderError) -> Self {
        self.analyses.lock().unwrap().push_back(Err(error));
        self
    }

    /// Answers generation for `path` with `content` in a python fence
    pub fn with_file(self, path: impl AsRef<Path>, content: &str) -> Self {
        let key = path.as_ref().display().to_string();
        let response = format!("Here you go:\n```python\n{}```\n", content);
        self.files.lock().unwrap().push((key, response));
        self
    }

    /// Answers generation for `path` with prose only
    pub fn refuse(self, path: impl AsRef<Path>) -> Self {
        let key = path.as_ref().display().to_string();
        self.files
            .lock()
            .unwrap()
            .push((key, "Sorry, I cannot help with that.".to_string()));
        self
    }

    pub fn analysis_calls(&self) -> usize {
        self.analysis_calls.load(Ordering::SeqCst)
    }

    pub fn generation_calls(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.analysis_calls() + self.generation_calls()
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn invoke(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError> {
        if system_prompt == ANALYSIS_SYSTEM_PROMPT {
            self.analysis_calls.fetch_add(1, Ordering::SeqCst);
            return self
                .analyses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Other("no analysis queued".to_string())));
        }

        self.generation_calls.fetch_add(1, Ordering::SeqCst);
        let files = self.files.lock().unwrap();
        // Longest key first so `a/b.py` wins over `b.py`
        let mut matches: Vec<&(String, String)> = files
            .iter()
            .filter(|(key, _)| user_prompt.contains(&format!("`{}`", key)))
            .collect();
        matches.sort_by_key(|(key, _)| std::cmp::Reverse(key.len()));
        Ok(matches
            .first()
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| "Sorry, that file is not in my script.".to_string()))
    }
}

/// In-memory filesystem that fails writes to chosen paths
#[derive(Debug, Clone, Default)]
pub struct FlakyFileSystem {
    inner: MemoryFileSystem,
    failing: Arc<Mutex<HashSet<PathBuf>>>,
    cancel_after: Arc<Mutex<HashMap<PathBuf, CancellationToken>>>,
    writes: Arc<AtomicUsize>,
}

impl FlakyFileSystem {
    pub fn new(inner: MemoryFileSystem) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Every write to `path` fails from now on
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.failing.lock().unwrap().insert(path.into());
    }

    /// Cancels `token` right after a successful write to `path`
    pub fn cancel_after_write(&self, path: impl Into<PathBuf>, token: CancellationToken) {
        self.cancel_after.lock().unwrap().insert(path.into(), token);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryFileSystem {
        &self.inner
    }
}

#[async_trait]
impl FileSystem for FlakyFileSystem {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, FileError> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, content: &[u8]) -> Result<(), FileError> {
        if self.failing.lock().unwrap().contains(path) {
            return Err(FileError::PermissionDenied(path.to_path_buf()));
        }
        self.inner.write(path, content).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let token = self.cancel_after.lock().unwrap().get(path).cloned();
        if let Some(token) = token {
            token.cancel();
        }
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), FileError> {
        self.inner.delete(path).await
    }

    async fn exists(&self, path: &Path) -> Result<bool, FileError> {
        self.inner.exists(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), FileError> {
        self.inner.remove_dir_all(path).await
    }
}

/// Confirmer that records how many diffs it was shown
pub struct RecordingConfirmer {
    answer: bool,
    seen: Mutex<Vec<usize>>,
}

impl RecordingConfirmer {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<usize> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirmer for RecordingConfirmer {
    async fn confirm(&self, _plan: &ChangePlan, diffs: &[DiffResult]) -> bool {
        self.seen.lock().unwrap().push(diffs.len());
        self.answer
    }
}

/// Files outside the backup directory
pub async fn project_files(fs: &MemoryFileSystem) -> std::collections::BTreeMap<PathBuf, Vec<u8>> {
    fs.snapshot()
        .await
        .into_iter()
        .filter(|(path, _)| !path.starts_with(".codeshift"))
        .collect()
}

/// Analysis response that modifies each path in order
pub fn modify_analysis(paths: &[&str]) -> String {
    let files: Vec<serde_json::Value> = paths
        .iter()
        .map(|path| {
            serde_json::json!({
                "file_path": path,
                "change_type": "MODIFY",
                "description": "Add type hints",
                "priority": "medium",
            })
        })
        .collect();
    serde_json::json!({
        "summary": "Add type hints to every function",
        "affected_files": files,
        "risks": [],
        "estimated_complexity": "low",
    })
    .to_string()
}
