//! Crate-level error type.
//!
//! Each subsystem keeps its own error enum (`ProviderError`, `ToolError`,
//! `PromptError`, `StorageError`, `ContextError`, `AgentError`); this module
//! only hosts the umbrella type used at the public API boundary.

use thiserror::Error;

/// Umbrella error for embedders that want a single error type.
#[derive(Debug, Error)]
pub enum OpenCoderError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Agent(#[from] crate::agent::AgentError),

    #[error(transparent)]
    Provider(#[from] crate::provider::ProviderError),

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    #[error(transparent)]
    Prompt(#[from] crate::prompts::PromptError),
}
