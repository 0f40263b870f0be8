//! Provider Factory
//!
//! Centralized, configuration-driven provider construction.

use super::anthropic::AnthropicProvider;
use super::openai::OpenAiProvider;
use super::r#trait::Provider;
use crate::config::{Config, ProviderConfig};
use anyhow::{Result, bail};
use std::sync::Arc;

/// Create the primary chat provider from `llm.default_provider`.
pub fn create_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let id = config.llm.default_provider.as_str();
    let provider_config = config.llm.providers.get(id).cloned().unwrap_or_default();
    build(id, &provider_config)
}

/// Create the compression provider. Falls back to the primary provider's
/// configuration when no dedicated one is set.
pub fn create_compression_provider(config: &Config) -> Result<Arc<dyn Provider>> {
    let id = config
        .llm
        .compression_provider
        .as_deref()
        .unwrap_or(config.llm.default_provider.as_str());
    let provider_config = config.llm.providers.get(id).cloned().unwrap_or_default();
    build(id, &provider_config)
}

fn build(id: &str, provider_config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    let api_key = provider_config.api_key.clone().unwrap_or_default();

    match id {
        "openai" | "deepseek" | "openrouter" => {
            let mut provider = match id {
                "deepseek" => OpenAiProvider::deepseek(api_key),
                "openrouter" => OpenAiProvider::openrouter(api_key),
                _ => OpenAiProvider::new(api_key),
            };
            if let Some(base_url) = &provider_config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &provider_config.model {
                provider = provider.with_model(model.clone());
            }
            if let Some(max_tokens) = provider_config.max_tokens {
                provider = provider.with_max_tokens(max_tokens);
            }
            if let Some(context_window) = provider_config.context_window {
                provider = provider.with_context_window(context_window);
            }
            tracing::info!("created provider: {}", id);
            Ok(Arc::new(provider))
        }
        "anthropic" => {
            let mut provider = AnthropicProvider::new(api_key);
            if let Some(base_url) = &provider_config.base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            if let Some(model) = &provider_config.model {
                provider = provider.with_model(model.clone());
            }
            if let Some(max_tokens) = provider_config.max_tokens {
                provider = provider.with_max_tokens(max_tokens);
            }
            if let Some(context_window) = provider_config.context_window {
                provider = provider.with_context_window(context_window);
            }
            tracing::info!("created provider: anthropic");
            Ok(Arc::new(provider))
        }
        other => bail!(
            "unknown provider \"{}\" (expected openai, deepseek, openrouter or anthropic)",
            other
        ),
    }
}
