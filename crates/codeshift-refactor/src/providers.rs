//! Collaborator traits the engine calls out to
//!
//! Text generation, semantic search and confirmation are supplied by the
//! embedding application. Each is a narrow async trait so tests can swap in
//! stubs.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use codeshift_files::DiffResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::RefactorError;
use crate::plan::ChangePlan;

/// Errors reported by collaborators
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The collaborator could not be reached
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The request was rejected or failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl From<ProviderError> for RefactorError {
    fn from(err: ProviderError) -> Self {
        RefactorError::Provider(err.to_string())
    }
}

/// Single-shot text generation
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends one system/user prompt pair and returns the raw response
    async fn invoke(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ProviderError>;
}

/// A semantic search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// File the snippet comes from
    pub path: PathBuf,
    /// Matching code
    pub snippet: String,
    /// Relevance score, higher is better
    pub score: f32,
}

/// Optional cross-file context lookup
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    /// Returns up to `k` snippets related to `query`
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>, ProviderError>;
}

/// Queries `search` for up to `k` hits, degrading to no context on failure
pub(crate) async fn gather_context(
    search: Option<&Arc<dyn SemanticSearch>>,
    query: &str,
    k: usize,
) -> Vec<SearchHit> {
    let Some(search) = search else {
        return Vec::new();
    };
    if k == 0 {
        return Vec::new();
    }

    match search.search(query, k).await {
        Ok(mut hits) => {
            hits.truncate(k);
            hits
        }
        Err(e) => {
            tracing::warn!(error = %e, "Semantic search unavailable, continuing without it");
            Vec::new()
        }
    }
}

/// Asks whether a previewed plan may be written
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Returns `true` to proceed with writing
    async fn confirm(&self, plan: &ChangePlan, diffs: &[DiffResult]) -> bool;
}

/// Confirmer that always proceeds
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl Confirmer for AutoConfirm {
    async fn confirm(&self, _plan: &ChangePlan, _diffs: &[DiffResult]) -> bool {
        true
    }
}
