//! Anthropic Provider Implementation
//!
//! Speaks the Anthropic messages API. Content is block-structured on the
//! wire; this adapter flattens it to the core's message shape and, while
//! streaming, accumulates `input_json_delta` fragments per block index into
//! complete tool calls.

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

const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    context_window: u32,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_ANTHROPIC_API_URL.to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 8192,
            context_window: 200_000,
            client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
                .build()
                .expect("failed to create HTTP client"),
        }
    }

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

    fn headers(&self) -> Result<reqwest::header::HeaderMap> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "x-api-key",
            self.api_key
                .trim()
                .parse()
                .map_err(|_| ProviderError::InvalidApiKey)?,
        );
        headers.insert(
            "anthropic-version",
            ANTHROPIC_VERSION.parse().expect("valid version header"),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            "application/json".parse().expect("valid content-type"),
        );
        Ok(headers)
    }

    /// Flatten core messages into the Anthropic block shape. System-role
    /// messages become the top-level system string; consecutive tool
    /// results merge into a single user message so they directly follow
    /// the assistant turn that requested them.
    fn to_wire_request(&self, request: &LLMRequest) -> WireRequest {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut messages: Vec<WireMessage> = Vec::new();

        for msg in &request.messages {
            match msg.role {
                Role::System => system_parts.push(&msg.content),
                Role::User => messages.push(WireMessage {
                    role: "user".to_string(),
                    content: vec![WireBlock::Text {
                        text: msg.content.clone(),
                    }],
                }),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !msg.content.is_empty() {
                        blocks.push(WireBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    for call in &msg.tool_calls {
                        let input = serde_json::from_str(&call.function.arguments)
                            .unwrap_or_else(|_| serde_json::json!({}));
                        blocks.push(WireBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.function.name.clone(),
                            input,
                        });
                    }
                    messages.push(WireMessage {
                        role: "assistant".to_string(),
                        content: blocks,
                    });
                }
                Role::Tool => {
                    let block = WireBlock::ToolResult {
                        tool_use_id: msg
                            .metadata
                            .get("tool_call_id")
                            .cloned()
                            .unwrap_or_default(),
                        content: msg.content.clone(),
                        is_error: Some(
                            msg.metadata.get("success").map(String::as_str) == Some("false"),
                        ),
                    };
                    match messages.last_mut() {
                        Some(last)
                            if last.role == "user"
                                && last
                                    .content
                                    .iter()
                                    .all(|b| matches!(b, WireBlock::ToolResult { .. })) =>
                        {
                            last.content.push(block);
                        }
                        _ => messages.push(WireMessage {
                            role: "user".to_string(),
                            content: vec![block],
                        }),
                    }
                }
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
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        input_schema: tool.parameters.clone(),
                    })
                    .collect(),
            )
        };

        WireRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            messages,
            temperature: request.temperature,
            stream: None,
            tools,
        }
    }

    fn from_wire_response(response: WireResponse) -> LLMResponse {
        let mut content = String::new();
        let mut tool_calls = Vec::new();

        for block in response.content {
            match block {
                WireBlock::Text { text } => {
                    if !content.is_empty() {
                        content.push_str("\n\n");
                    }
                    content.push_str(&text);
                }
                WireBlock::ToolUse { id, name, input } => {
                    let arguments = serde_json::to_string(&input).unwrap_or_default();
                    tool_calls.push(ToolCall::new(id, name, arguments));
                }
                WireBlock::ToolResult { .. } => {}
            }
        }

        let prompt = response.usage.input_tokens;
        let completion = response.usage.output_tokens;
        LLMResponse {
            id: response.id,
            content,
            role: Role::Assistant,
            tool_calls,
            usage: TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            },
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
impl Provider for AnthropicProvider {
    async fn chat(&self, request: LLMRequest) -> Result<LLMResponse> {
        let wire = self.to_wire_request(&request);
        tracing::debug!(
            "anthropic chat request: model={}, messages={}, tools={}",
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
                Ok(Self::from_wire_response(body))
            },
            &retry_config,
        )
        .await
    }

    async fn chat_stream(&self, request: LLMRequest) -> Result<ProviderStream> {
        let mut wire = self.to_wire_request(&request);
        wire.stream = Some(true);

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

        struct StreamState {
            buffer: String,
            assembler: ToolCallAssembler,
            input_tokens: u32,
        }
        let state = Arc::new(Mutex::new(StreamState {
            buffer: String::new(),
            assembler: ToolCallAssembler::new(),
            input_tokens: 0,
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

                    let event: WireStreamEvent = match serde_json::from_str(data) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::warn!(
                                "skipping malformed stream event: {} | {}",
                                e,
                                data.chars().take(200).collect::<String>()
                            );
                            continue;
                        }
                    };

                    match event {
                        WireStreamEvent::MessageStart { message } => {
                            st.input_tokens = message.usage.input_tokens;
                            out.push(Ok(StreamChunk {
                                id: Some(message.id),
                                role: Some(Role::Assistant),
                                ..Default::default()
                            }));
                        }
                        WireStreamEvent::ContentBlockStart {
                            index,
                            content_block,
                        } => {
                            if let WireBlock::ToolUse { id, name, .. } = content_block {
                                st.assembler.add_fragment(index, Some(&id), Some(&name), None);
                            }
                        }
                        WireStreamEvent::ContentBlockDelta { index, delta } => match delta {
                            WireDelta::TextDelta { text } => {
                                out.push(Ok(StreamChunk {
                                    content_delta: text,
                                    ..Default::default()
                                }));
                            }
                            WireDelta::InputJsonDelta { partial_json } => {
                                st.assembler
                                    .add_fragment(index, None, None, Some(&partial_json));
                            }
                        },
                        WireStreamEvent::MessageDelta { delta, usage } => {
                            let completion =
                                usage.map(|u| u.output_tokens).unwrap_or_default();
                            let prompt = st.input_tokens;
                            out.push(Ok(StreamChunk {
                                tool_calls: st.assembler.finish(),
                                finish_reason: delta.stop_reason,
                                usage: Some(TokenUsage {
                                    prompt_tokens: prompt,
                                    completion_tokens: completion,
                                    total_tokens: prompt + completion,
                                }),
                                ..Default::default()
                            }));
                        }
                        WireStreamEvent::Error { error } => {
                            out.push(Err(ProviderError::Stream(error.message)));
                        }
                        WireStreamEvent::ContentBlockStop { .. }
                        | WireStreamEvent::MessageStop
                        | WireStreamEvent::Ping => {}
                    }
                }

                out
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(chunk_stream))
    }

    fn provider(&self) -> &str {
        "anthropic"
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
// Wire types (Anthropic messages dialect)
// ============================================================================

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: Vec<WireBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: String,
    content: Vec<WireBlock>,
    usage: WireUsage,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireStreamEvent {
    MessageStart {
        message: WireStreamMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: WireBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: WireDelta,
    },
    ContentBlockStop {
        #[allow(dead_code)]
        index: usize,
    },
    MessageDelta {
        delta: WireMessageDelta,
        #[serde(default)]
        usage: Option<WireUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: WireErrorBody,
    },
}

#[derive(Debug, Deserialize)]
struct WireStreamMessage {
    id: String,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

#[derive(Debug, Deserialize)]
struct WireMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireErrorResponse {
    error: WireErrorBody,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_messages_lift_to_system_field() {
        let provider = AnthropicProvider::new("k".into());
        let request = LLMRequest::new(vec![
            Message::system("You are helpful."),
            Message::system("Environment: linux"),
            Message::user("hi"),
        ]);
        let wire = provider.to_wire_request(&request);
        assert_eq!(
            wire.system.as_deref(),
            Some("You are helpful.\n\nEnvironment: linux")
        );
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].role, "user");
    }

    #[test]
    fn test_consecutive_tool_results_merge() {
        let provider = AnthropicProvider::new("k".into());
        let request = LLMRequest::new(vec![
            Message::assistant_with_tool_calls(
                "",
                vec![
                    ToolCall::new("t1", "read", "{\"file_path\":\"/a\"}"),
                    ToolCall::new("t2", "read", "{\"file_path\":\"/b\"}"),
                ],
            ),
            Message::tool("a", "t1", "read", true),
            Message::tool("b", "t2", "read", false),
        ]);
        let wire = provider.to_wire_request(&request);
        assert_eq!(wire.messages.len(), 2);
        assert_eq!(wire.messages[1].role, "user");
        assert_eq!(wire.messages[1].content.len(), 2);
        match &wire.messages[1].content[1] {
            WireBlock::ToolResult {
                tool_use_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_use_id, "t2");
                assert_eq!(*is_error, Some(true));
            }
            other => panic!("expected tool_result, got {other:?}"),
        }
    }

    #[test]
    fn test_response_flattening() {
        let raw = r#"{
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "Let me read that."},
                {"type": "tool_use", "id": "t1", "name": "read", "input": {"file_path": "/tmp/x"}}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 4}
        }"#;
        let wire: WireResponse = serde_json::from_str(raw).unwrap();
        let response = AnthropicProvider::from_wire_response(wire);
        assert_eq!(response.content, "Let me read that.");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].function.name, "read");
        assert_eq!(response.usage.total_tokens, 14);
        let args: serde_json::Value =
            serde_json::from_str(&response.tool_calls[0].function.arguments).unwrap();
        assert_eq!(args["file_path"], "/tmp/x");
    }

    #[test]
    fn test_stream_event_parsing() {
        let raw = r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"file"}}"#;
        let event: WireStreamEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            event,
            WireStreamEvent::ContentBlockDelta {
                index: 0,
                delta: WireDelta::InputJsonDelta { .. }
            }
        ));
    }
}
