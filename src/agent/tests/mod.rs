mod basic;
mod streaming;

use super::*;
use crate::config::{PromptsConfig, ToolsConfig};
use crate::context::ContextManager;
use crate::message::{Role, ToolCall};
use crate::prompts::PromptManager;
use crate::provider::{
    LLMRequest, LLMResponse, Provider, ProviderRuntimeConfig, ProviderStream,
    Result as ProviderResult, StreamChunk, TokenUsage,
};
use crate::storage::FileSessionStorage;
use crate::tools::{ToolEngine, ToolRegistry};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Provider that replays a fixed list of responses and records every
/// request it saw. Streaming replays the same responses as chunked
/// deltas with the tool calls attached to the terminal chunk.
pub(super) struct ScriptedProvider {
    responses: Mutex<VecDeque<LLMResponse>>,
    pub requests: Mutex<Vec<LLMRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<LLMResponse>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_response(&self) -> LLMResponse {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| text_response("done"))
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(&self, request: LLMRequest) -> ProviderResult<LLMResponse> {
        self.requests.lock().unwrap().push(request);
        Ok(self.next_response())
    }

    async fn chat_stream(&self, request: LLMRequest) -> ProviderResult<ProviderStream> {
        self.requests.lock().unwrap().push(request);
        let response = self.next_response();

        let mut chunks: Vec<ProviderResult<StreamChunk>> = Vec::new();
        chunks.push(Ok(StreamChunk {
            id: Some(response.id.clone()),
            role: Some(Role::Assistant),
            ..Default::default()
        }));

        // Split content into two deltas so consumers see real increments
        let content = response.content;
        let mid = content
            .char_indices()
            .nth(content.chars().count() / 2)
            .map(|(i, _)| i)
            .unwrap_or(0);
        for part in [&content[..mid], &content[mid..]] {
            if !part.is_empty() {
                chunks.push(Ok(StreamChunk {
                    content_delta: part.to_string(),
                    ..Default::default()
                }));
            }
        }

        chunks.push(Ok(StreamChunk {
            tool_calls: response.tool_calls,
            usage: Some(response.usage),
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        }));

        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn provider(&self) -> &str {
        "scripted"
    }

    fn config(&self) -> ProviderRuntimeConfig {
        ProviderRuntimeConfig {
            model: "scripted-model".to_string(),
            max_tokens: 4096,
            context_window: 100_000,
        }
    }
}

pub(super) fn text_response(content: &str) -> LLMResponse {
    LLMResponse {
        id: "resp".to_string(),
        content: content.to_string(),
        role: Role::Assistant,
        tool_calls: Vec::new(),
        usage: TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 20,
            total_tokens: 30,
        },
    }
}

pub(super) fn tool_response(content: &str, calls: Vec<ToolCall>) -> LLMResponse {
    LLMResponse {
        tool_calls: calls,
        ..text_response(content)
    }
}

pub(super) struct TestAgent {
    pub agent: Arc<Agent>,
    pub provider: Arc<ScriptedProvider>,
    pub workspace: PathBuf,
    _dirs: Vec<tempfile::TempDir>,
}

/// Full runtime wired against temp dirs and the scripted provider. Real
/// tools, real storage, real prompt manager.
pub(super) async fn test_agent(responses: Vec<LLMResponse>) -> TestAgent {
    let storage_dir = tempfile::tempdir().unwrap();
    let prompts_dir = tempfile::tempdir().unwrap();
    let workspace_dir = tempfile::tempdir().unwrap();
    let workspace = workspace_dir.path().to_path_buf();

    let provider = Arc::new(ScriptedProvider::new(responses));
    let prompts = Arc::new(
        PromptManager::new(&PromptsConfig {
            directory: prompts_dir.path().to_path_buf(),
            hot_reload: false,
        })
        .unwrap(),
    );
    let storage = Arc::new(FileSessionStorage::new(storage_dir.path()).unwrap());
    let context = Arc::new(
        ContextManager::new(
            storage,
            provider.clone(),
            prompts.clone(),
            6,
            0.9,
            Some(100_000),
            "notes.md".to_string(),
        )
        .await
        .unwrap(),
    );

    let tools_config = ToolsConfig::default();
    let registry = Arc::new(ToolRegistry::from_enabled(&tools_config.enabled_tools));
    let engine = Arc::new(ToolEngine::new(registry, &tools_config, workspace.clone()));

    let agent = Agent::new(provider.clone(), context, engine, prompts)
        .with_working_directory(workspace.clone())
        .with_max_loops(8);

    TestAgent {
        agent: Arc::new(agent),
        provider,
        workspace,
        _dirs: vec![storage_dir, prompts_dir, workspace_dir],
    }
}
