//! OpenAI-Compatible Provider Implementation
//!
//! Speaks the OpenAI chat completions protocol, which also covers
//! DeepSeek, OpenRouter and local servers (Ollama, LM Studio, vLLM). The
//! streaming path parses SSE lines itself and reassembles fragmented tool
//! calls per index before they leave this adapter.

use super::error::{ProviderError, Result};
use super::r#trait::Provider;
use super::retry::{RetryConfig, retry_with_backoff};
use super::types::*;
use crate::message::{Message, Role, ToolCall};
use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEEPSEEK_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";
const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider for any OpenAI-compatible chat completions endpoint.
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    context_window: u32,
    client: Client,
    name: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_OPENAI_API_URL.to_string(),
            model: "gpt-4o".to_string(),
            max_tokens: 8192,
            context_window: 128_000,
            client: Self::build_client(),
            name: "openai".to_string(),
        }
    }

    /// DeepSeek speaks the same dialect on its own endpoint.
    pub fn deepseek(api_key: String) -> Self {
        let mut provider = Self::new(api_key);
        provider.base_url = DEEPSEEK_API_URL.to_string();
        provider.model = "deepseek-chat".to_string();
        provider.context_window = 64_000;
        provider.name = "deepseek".to_string();
        provider
    }

    /// OpenRouter proxy endpoint.
    pub fn openrouter(api_key: String) -> Self {
        let mut provider = Self::new(api_key);
        provider.base_url = OPENROUTER_API_URL.to_string();
        provider.name = "openrouter".to_string();
        provider
    }

    /// Point at a custom endpoint (local servers, gateways).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_context_window(mut self, context_window: u32) -> Self {
        self.context_window = context_window;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    fn build_client() -> Client {
        Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .expect("failed to create HTTP client")
    }

    fn headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        let clean_key = self.api_key.trim();
        if !clean_key.is_empty() {
            let value: reqwest::header::HeaderValue = format!("Bearer {clean_key}")
                .parse()
                .map_err(|_| ProviderError::InvalidApiKey)?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "application/json".parse().expect("valid content-type"),
        );
        Ok(headers)
    }

    fn to_wire_request(&self, request: &LLMRequest) -> WireRequest {
        let mut messages = Vec::with_capacity(request.messages.len());
        for msg in &request.messages {
            match msg.role {
                Role::System | Role::User => messages.push(WireMessage {
                    role: msg.role.to_string(),
                    content: Some(msg.content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                }),
                Role::Assistant => messages.push(WireMessage {
                    role: "assistant".to_string(),
                    content: if msg.content.is_empty() && !msg.tool_calls.is_empty() {
                        None
                    } else {
                        Some(msg.content.clone())
                    },
                    tool_calls: if msg.tool_calls.is_empty() {
                        None
                    } else {
                        Some(msg.tool_calls.clone())
                    },
                    tool_call_id: None,
                }),
                Role::Tool => messages.push(WireMessage {
                    role: "tool".to_string(),
                    content: Some(msg.content.clone()),
                    tool_calls: None,
                    tool_call_id: msg.metadata.get("tool_call_id").cloned(),
                }),
            }
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|tool| WireTool {
                        tool_type: "function".to_string(),
                        function: WireFunction {
                            name: tool.name.clone(),
                            description: tool.description.clone(),
                            parameters: tool.parameters.clone(),
                        },
                    })
                    .collect(),
            )
        };

        WireRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            temperature: request.temperature,
            max_tokens: Some(request.max_tokens.unwrap_or(self.max_tokens)),
            stream: None,
            stream_options: None,
            tools,
        }
    }

    fn from_wire_response(response: WireResponse) -> LLMResponse {
        let choice = response.choices.into_iter().next();
        let (content, tool_calls) = match choice {
            Some(c) => (
                c.message.content.unwrap_or_default(),
                c.message.tool_calls.unwrap_or_default(),
            ),
            None => (String::new(), Vec::new()),
        };

        let usage = response.usage.map(WireUsage::into_usage).unwrap_or_default();

        LLMResponse {
            id: response.id,
            content,
            role: Role::Assistant,
            tool_calls,
            usage,
        }
    }

    async fn handle_error(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let message = match response.json::<WireErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => "unknown error".to_string(),
        };
        if status == 429 {
            ProviderError::RateLimited(message)
        } else {
            ProviderError::Api { status, message }
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse> {
        let wire = self.to_wire_request(&request);
        tracing::debug!(
            "{} chat request: model={}, messages={}, tools={}",
            self.name,
            wire.model,
            wire.messages.len(),
            wire.tools.as_ref().map(|t| t.len()).unwrap_or(0)
        );

        let retry_config = RetryConfig::default();
        retry_with_backoff(
            || async {
                let response = self
                    .client
                    .post(&self.base_url)
                    .headers(self.headers()?)
                    .json(&wire)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(Self::handle_error(response).await);
                }

                let body: WireResponse = response.json().await?;
                let llm_response = Self::from_wire_response(body);
                tracing::debug!(
                    "{} chat response: prompt_tokens={}, completion_tokens={}, tool_calls={}",
                    self.name,
                    llm_response.usage.prompt_tokens,
                    llm_response.usage.completion_tokens,
                    llm_response.tool_calls.len()
                );
                Ok(llm_response)
            },
            &retry_config,
        )
        .await
    }

    async fn chat_stream(&self, request: LLMRequest) -> Result<ProviderStream> {
        let mut wire = self.to_wire_request(&request);
        wire.stream = Some(true);
        wire.stream_options = Some(StreamOptions { include_usage: true });

        let retry_config = RetryConfig::default();
        let response = retry_with_backoff(
            || async {
                let response = self
                    .client
                    .post(&self.base_url)
                    .headers(self.headers()?)
                    .json(&wire)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(Self::handle_error(response).await);
                }
                Ok(response)
            },
            &retry_config,
        )
        .await?;

        // Line-buffered SSE parse. State survives across byte chunks.
        struct StreamState {
            buffer: String,
            assembler: ToolCallAssembler,
            sent_done: bool,
        }
        let state = Arc::new(Mutex::new(StreamState {
            buffer: String::new(),
            assembler: ToolCallAssembler::new(),
            sent_done: false,
        }));

        let byte_stream = response.bytes_stream();
        let chunk_stream = byte_stream
            .map(move |chunk_result| -> Vec<Result<StreamChunk>> {
                let bytes = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => return vec![Err(ProviderError::Stream(e.to_string()))],
                };

                let mut st = state.lock().expect("SSE state lock poisoned");
                st.buffer.push_str(&String::from_utf8_lossy(&bytes));

                let mut out = Vec::new();
                while let Some(newline) = st.buffer.find('\n') {
                    let line = st.buffer[..newline].trim().to_string();
                    st.buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    if data == "[DONE]" {
                        // Flush any calls that never saw a finish_reason.
                        let leftover = st.assembler.finish();
                        if !leftover.is_empty() || !st.sent_done {
                            st.sent_done = true;
                            out.push(Ok(StreamChunk {
                                tool_calls: leftover,
                                finish_reason: Some("stop".to_string()),
                                ..Default::default()
                            }));
                        }
                        continue;
                    }

                    let parsed: WireStreamChunk = match serde_json::from_str(data) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            tracing::warn!(
                                "skipping malformed stream chunk: {} | {}",
                                e,
                                data.chars().take(200).collect::<String>()
                            );
                            continue;
                        }
                    };

                    let mut chunk = StreamChunk {
                        id: if parsed.id.is_empty() { None } else { Some(parsed.id) },
                        ..Default::default()
                    };

                    if let Some(choice) = parsed.choices.first() {
                        if let Some(delta) = &choice.delta {
                            if delta.role.as_deref() == Some("assistant") {
                                chunk.role = Some(Role::Assistant);
                            }
                            if let Some(content) = &delta.content {
                                chunk.content_delta.push_str(content);
                            }
                            if let Some(tool_calls) = &delta.tool_calls {
                                for tc in tool_calls {
                                    st.assembler.add_fragment(
                                        tc.index,
                                        tc.id.as_deref(),
                                        tc.function.as_ref().and_then(|f| f.name.as_deref()),
                                        tc.function.as_ref().and_then(|f| f.arguments.as_deref()),
                                    );
                                }
                            }
                        }

                        if let Some(reason) = &choice.finish_reason {
                            chunk.finish_reason = Some(reason.clone());
                            chunk.tool_calls = st.assembler.finish();
                            st.sent_done = true;
                        }
                    }

                    if let Some(usage) = parsed.usage {
                        chunk.usage = Some(usage.into_usage());
                    }

                    let has_payload = !chunk.content_delta.is_empty()
                        || !chunk.tool_calls.is_empty()
                        || chunk.finish_reason.is_some()
                        || chunk.usage.is_some()
                        || chunk.role.is_some();
                    if has_payload {
                        out.push(Ok(chunk));
                    }
                }

                out
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(chunk_stream))
    }

    fn provider(&self) -> &str {
        &self.name
    }

    fn config(&self) -> ProviderRuntimeConfig {
        ProviderRuntimeConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            context_window: self.context_window,
        }
    }
}

// ============================================================================
// Wire types (OpenAI chat completions dialect)
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: String,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: String,
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl WireUsage {
    fn into_usage(self) -> TokenUsage {
        let total = if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        };
        TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: total,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: Option<WireDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireStreamToolCall>>,
}

/// Streamed tool-call fragment. The first fragment for an index carries
/// id and name; continuation fragments only argument text.
#[derive(Debug, Deserialize)]
struct WireStreamToolCall {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct WireStreamFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}
