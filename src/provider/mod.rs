//! LLM Provider Abstraction Layer
//!
//! Provides a unified chat / chat-stream interface over provider-specific
//! wire formats. Streaming tool-call reassembly is a responsibility of each
//! adapter: the fragments a provider emits are accumulated per index and
//! only complete `ToolCall` values leave this layer.

pub mod error;
pub mod factory;
pub mod retry;
#[allow(clippy::module_inception)]
mod r#trait;
pub mod types;

pub use error::{ProviderError, Result};
pub use factory::{create_compression_provider, create_provider};
pub use r#trait::Provider;
pub use types::*;

// Provider implementations
pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
