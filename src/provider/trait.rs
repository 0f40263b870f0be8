//! The provider capability the core consumes.

use super::error::Result;
use super::types::{LLMRequest, LLMResponse, ProviderRuntimeConfig, ProviderStream};
use async_trait::async_trait;

/// Uniform chat interface over provider-specific wire formats.
///
/// Implementations own everything dialect-specific, including the
/// reassembly of fragmented streaming tool calls. The agent loop treats
/// all providers interchangeably.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Single request/response chat completion.
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse>;

    /// Streaming chat completion. The returned stream terminates promptly
    /// when the caller drops it.
    async fn chat_stream(&self, request: LLMRequest) -> Result<ProviderStream>;

    /// Stable provider id ("openai", "anthropic", ...).
    fn provider(&self) -> &str;

    /// Runtime parameters (model, token limits) for this client.
    fn config(&self) -> ProviderRuntimeConfig;
}
