#![warn(missing_docs)]

//! Codeshift refactoring engine
//!
//! Plans and applies multi-file changes described by a natural-language
//! instruction.
//!
//! # Architecture
//!
//! - **Analysis**: [`RefactorAnalyzer`] filters the candidate files, asks a
//!   [`TextGenerator`] which of them must change and builds a [`ChangePlan`]
//! - **Ordering**: [`DependencyOrderer`] sorts the plan so dependencies are
//!   applied first and rejects cycles
//! - **Generation**: [`ContentGenerator`] produces the full new content of
//!   each file, one call per change
//! - **Application**: [`TransactionalApplier`] previews every change as a
//!   diff, snapshots each path before writing and rolls everything back on
//!   the first failure
//!
//! # Example
//!
//! ```ignore
//! use codeshift_refactor::{ApplyOptions, RefactorAnalyzer, RefactorConfig, TransactionalApplier};
//!
//! let config = RefactorConfig::default();
//! let analyzer = RefactorAnalyzer::new(fs.clone(), llm.clone());
//! let mut plan = analyzer.analyze("Add type hints", &files, &config).await?;
//!
//! let applier = TransactionalApplier::new(fs, llm, config);
//! let result = applier.apply(&mut plan, ApplyOptions::default()).await?;
//! println!("{}", result.to_json()?);
//! ```

pub mod analyzer;
pub mod applier;
pub mod config;
pub mod error;
pub mod extract;
pub mod generator;
pub mod orderer;
pub mod plan;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod result;
pub mod types;

// Re-export commonly used types
pub use analyzer::RefactorAnalyzer;
pub use applier::{ApplyOptions, TransactionalApplier};
pub use config::{ConfigLoader, RefactorConfig};
pub use error::{RefactorError, Result};
pub use extract::{extract_code, parse_json_response, ParseOutcome};
pub use generator::ContentGenerator;
pub use orderer::DependencyOrderer;
pub use plan::ChangePlan;
pub use progress::{progress_channel, ProgressEvent, ProgressReceiver, ProgressSender};
pub use providers::{AutoConfirm, Confirmer, ProviderError, SearchHit, SemanticSearch, TextGenerator};
pub use result::{BackupEntrySummary, BackupSummary, ChangeOutcome, RefactorResult, ResultError};
pub use types::{
    ChangeId, ChangeStatus, ChangeType, ExcludedFile, ExclusionReason, FileChange, PlanStatus,
    Priority,
};
