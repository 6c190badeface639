//! Configuration types for planning and applying changes

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RefactorError, Result};

const DEFAULT_EXTENSIONS: &[(&str, &str)] = &[
    (".py", "python"),
    (".pyi", "python"),
    (".js", "javascript"),
    (".jsx", "javascript"),
    (".mjs", "javascript"),
    (".ts", "typescript"),
    (".tsx", "typescript"),
    (".rs", "rust"),
    (".go", "go"),
    (".java", "java"),
    (".kt", "kotlin"),
    (".rb", "ruby"),
    (".php", "php"),
    (".c", "c"),
    (".h", "c"),
    (".cpp", "cpp"),
    (".hpp", "cpp"),
    (".cs", "csharp"),
    (".swift", "swift"),
    (".sh", "bash"),
    (".toml", "toml"),
    (".yaml", "yaml"),
    (".yml", "yaml"),
    (".json", "json"),
    (".md", "markdown"),
];

/// Settings for a refactoring run
///
/// Passed explicitly to the analyzer and applier; every field has a default
/// so partial configuration files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefactorConfig {
    /// Maximum number of candidate files per run
    pub max_files: usize,
    /// Maximum size of a single file in bytes
    pub max_file_size_bytes: u64,
    /// Extensions (with leading dot) considered for analysis
    pub allowed_extensions: Vec<String>,
    /// Extension (with leading dot) to language tag
    pub language_map: BTreeMap<String, String>,
    /// Snapshot files before writing
    pub create_backup: bool,
    /// Keep the backup after a successful run
    pub keep_backup: bool,
    /// Directory under which backups are created
    pub backup_dir: PathBuf,
    /// Ask the confirmer before writing
    pub require_confirmation: bool,
    /// Maximum concurrent generation calls within one dependency level
    pub generation_concurrency: usize,
    /// Maximum bytes of file content per analysis prompt
    pub context_budget_bytes: usize,
    /// Number of semantic search results requested
    pub search_results: usize,
}

impl Default for RefactorConfig {
    fn default() -> Self {
        Self {
            max_files: 20,
            max_file_size_bytes: 500 * 1024,
            allowed_extensions: DEFAULT_EXTENSIONS
                .iter()
                .map(|(ext, _)| ext.to_string())
                .collect(),
            language_map: DEFAULT_EXTENSIONS
                .iter()
                .map(|(ext, lang)| (ext.to_string(), lang.to_string()))
                .collect(),
            create_backup: true,
            keep_backup: false,
            backup_dir: PathBuf::from(".codeshift/backups"),
            require_confirmation: true,
            generation_concurrency: 4,
            context_budget_bytes: 48 * 1024,
            search_results: 5,
        }
    }
}

impl RefactorConfig {
    /// Whether the extension of `path` is in the allow-list
    pub fn is_allowed(&self, path: &Path) -> bool {
        match dotted_extension(path) {
            Some(ext) => self
                .allowed_extensions
                .iter()
                .any(|allowed| normalize_extension(allowed) == ext),
            None => false,
        }
    }

    /// Language tag for `path`, if its extension is mapped
    pub fn language_for(&self, path: &Path) -> Option<String> {
        let ext = dotted_extension(path)?;
        self.language_map
            .iter()
            .find(|(mapped, _)| normalize_extension(mapped) == ext)
            .map(|(_, lang)| lang.clone())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_files == 0 {
            return Err(RefactorError::InvalidConfiguration(
                "max_files must be greater than zero".to_string(),
            ));
        }

        if self.max_file_size_bytes == 0 {
            return Err(RefactorError::InvalidConfiguration(
                "max_file_size_bytes must be greater than zero".to_string(),
            ));
        }

        if self.allowed_extensions.is_empty() {
            return Err(RefactorError::InvalidConfiguration(
                "At least one file extension must be specified".to_string(),
            ));
        }

        if self.generation_concurrency == 0 {
            return Err(RefactorError::InvalidConfiguration(
                "generation_concurrency must be greater than zero".to_string(),
            ));
        }

        if self.context_budget_bytes == 0 {
            return Err(RefactorError::InvalidConfiguration(
                "context_budget_bytes must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn dotted_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}
