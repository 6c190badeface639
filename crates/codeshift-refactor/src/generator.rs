//! Content generation for individual changes

use std::sync::Arc;

use crate::error::{RefactorError, Result};
use crate::extract::extract_code;
use crate::prompts::{generation_prompt, GENERATION_SYSTEM_PROMPT};
use crate::providers::{SearchHit, TextGenerator};
use crate::types::{ChangeType, FileChange};

/// Produces the new content of a file through a [`TextGenerator`]
#[derive(Clone)]
pub struct ContentGenerator {
    generator: Arc<dyn TextGenerator>,
}

impl ContentGenerator {
    /// Creates a generator backed by `generator`
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generates the full new content for `change`
    ///
    /// Makes exactly one call to the underlying generator. Deletions never
    /// generate content.
    ///
    /// # Errors
    ///
    /// Returns [`RefactorError::Provider`] if the call fails and
    /// [`RefactorError::GenerationFailure`] if the response holds no code.
    pub async fn generate(
        &self,
        change: &FileChange,
        instruction: &str,
        file_content: Option<&str>,
        search_context: &[SearchHit],
    ) -> Result<String> {
        if change.change_type == ChangeType::Delete {
            return Err(RefactorError::InvalidState(format!(
                "{} is a delete and has no content to generate",
                change.id
            )));
        }

        let prompt = generation_prompt(change, instruction, file_content, search_context);
        tracing::debug!(change_id = %change.id, path = ?change.path, "Generating content");

        let response = self
            .generator
            .invoke(GENERATION_SYSTEM_PROMPT, &prompt)
            .await?;

        extract_code(&response, change.language.as_deref()).ok_or_else(|| {
            tracing::warn!(change_id = %change.id, "No code found in generation response");
            RefactorError::GenerationFailure {
                change_id: change.id.clone(),
                raw_response: response,
            }
        })
    }
}
