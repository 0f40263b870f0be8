//! Context / Memory Manager
//!
//! Owns the per-session message log, token accounting and LLM-assisted
//! compaction, and persists every append through the storage layer.

mod manager;
pub mod tokens;

pub use manager::ContextManager;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("session not found: {0}")]
    NotFound(uuid::Uuid),

    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),

    #[error(transparent)]
    Provider(#[from] crate::provider::ProviderError),

    #[error(transparent)]
    Prompt(#[from] crate::prompts::PromptError),
}

pub type Result<T> = std::result::Result<T, ContextError>;
