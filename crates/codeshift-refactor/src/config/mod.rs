//! Configuration management for refactoring runs

pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::RefactorConfig;
