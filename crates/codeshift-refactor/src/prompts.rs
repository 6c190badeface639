//! Prompt templates for analysis and content generation

use std::path::Path;

use crate::providers::SearchHit;
use crate::types::{ChangeType, FileChange};

/// System prompt for plan analysis
pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are a code refactoring planner. Given an instruction and a set of files, decide which files must change.

Respond with a single JSON object and nothing else:
{
  "summary": "one sentence describing the overall change",
  "affected_files": [
    {
      "file_path": "path exactly as given",
      "change_type": "modify | create | delete | rename | none",
      "previous_path": "source path, only for rename",
      "description": "why this file changes",
      "priority": "high | medium | low",
      "depends_on": ["paths of files that must change first"]
    }
  ],
  "risks": ["anything that could break"],
  "estimated_complexity": "low | medium | high"
}"#;

/// System prompt for content generation
pub const GENERATION_SYSTEM_PROMPT: &str = "You are a precise code editor. Return the complete content of the requested file in a single fenced code block. Do not explain the change.";

/// A file shown to the analysis prompt
#[derive(Debug, Clone)]
pub struct PromptFile<'a> {
    /// Path as given by the caller
    pub path: &'a Path,
    /// Language tag, if known
    pub language: Option<&'a str>,
    /// File content
    pub content: &'a str,
}

/// Builds the user prompt for one analysis batch
pub fn analysis_prompt(instruction: &str, files: &[PromptFile<'_>], hits: &[SearchHit]) -> String {
    let mut prompt = format!("## Instruction\n{}\n\n## Files\n", instruction);

    for file in files {
        prompt.push_str(&format!(
            "\n### {}\n```{}\n{}\n```\n",
            file.path.display(),
            file.language.unwrap_or(""),
            file.content.trim_end()
        ));
    }

    push_search_context(&mut prompt, hits);
    prompt
}

/// Builds the user prompt that asks for the new content of one file
pub fn generation_prompt(
    change: &FileChange,
    instruction: &str,
    file_content: Option<&str>,
    hits: &[SearchHit],
) -> String {
    let language = change.language.as_deref().unwrap_or("");
    let mut prompt = format!("## Instruction\n{}\n\n", instruction);

    match change.change_type {
        ChangeType::Create => {
            prompt.push_str(&format!(
                "## Task\nCreate the new file `{}`.\nReason: {}\n",
                change.path.display(),
                change.rationale
            ));
        }
        ChangeType::Modify => {
            prompt.push_str(&format!(
                "## Task\nRewrite `{}` to carry out the instruction.\nReason: {}\n",
                change.path.display(),
                change.rationale
            ));
        }
        ChangeType::Rename => {
            let previous = change
                .previous_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            prompt.push_str(&format!(
                "## Task\nThe file `{}` is moving to `{}`. Return its content for the new location, updating anything that depends on its path or module name.\nReason: {}\n",
                previous,
                change.path.display(),
                change.rationale
            ));
        }
        ChangeType::Delete => {
            prompt.push_str(&format!(
                "## Task\nThe file `{}` will be deleted.\n",
                change.path.display()
            ));
        }
    }

    if let Some(content) = file_content {
        prompt.push_str(&format!(
            "\n## Current content\n```{}\n{}\n```\n",
            language,
            content.trim_end()
        ));
    }

    push_search_context(&mut prompt, hits);
    prompt.push_str(&format!(
        "\nReturn the complete file as a ```{} code block.\n",
        language
    ));
    prompt
}

fn push_search_context(prompt: &mut String, hits: &[SearchHit]) {
    if hits.is_empty() {
        return;
    }
    prompt.push_str("\n## Related code\n");
    for hit in hits {
        prompt.push_str(&format!(
            "\n// {}\n{}\n",
            hit.path.display(),
            hit.snippet.trim_end()
        ));
    }
}
