//! Configuration loader for refactoring runs

use std::path::Path;

use crate::config::types::RefactorConfig;
use crate::error::{RefactorError, Result};

/// Loads refactoring configuration from files
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub fn load_from_yaml(path: &Path) -> Result<RefactorConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RefactorError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        serde_yaml::from_str(&content)
            .map_err(|e| RefactorError::ConfigError(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from a JSON file
    pub fn load_from_json(path: &Path) -> Result<RefactorConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RefactorError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| RefactorError::ConfigError(format!("Failed to parse JSON: {}", e)))
    }

    /// Load configuration from a file (auto-detect format) and validate it
    pub fn load(path: &Path) -> Result<RefactorConfig> {
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::load_from_yaml(path)?,
            Some("json") => Self::load_from_json(path)?,
            _ => {
                return Err(RefactorError::ConfigError(
                    "Unsupported configuration file format".to_string(),
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }
}
