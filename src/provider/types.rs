//! Provider-facing request, response and streaming types.

use crate::message::{Message, Role, ToolCall};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::pin::Pin;

/// A tool made visible to the model: name, description and the JSON-schema
/// shaped parameter description the model reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A chat request in the core's own shape; adapters translate to the wire.
#[derive(Debug, Clone)]
pub struct LLMRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub stream: bool,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub model: Option<String>,
}

impl LLMRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            stream: false,
            max_tokens: None,
            temperature: None,
            model: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// A complete (non-streaming) chat response.
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

/// One increment of a streaming response.
///
/// Adapters reassemble fragmented tool calls internally; `tool_calls` is
/// only populated on the chunk that carries the terminal `finish_reason`
/// (or on the stream-end flush) and always holds complete calls.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub id: Option<String>,
    pub content_delta: String,
    pub role: Option<Role>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<String>,
}

/// Lazy sequence of stream chunks.
pub type ProviderStream =
    Pin<Box<dyn futures::Stream<Item = super::Result<StreamChunk>> + Send>>;

/// Runtime parameters the core reads off a provider.
#[derive(Debug, Clone)]
pub struct ProviderRuntimeConfig {
    pub model: String,
    pub max_tokens: u32,
    pub context_window: u32,
}

/// Accumulates streamed tool-call fragments keyed by the provider-assigned
/// integer index. Argument fragments are concatenated in arrival order
/// within each index; `finish` yields the assembled calls in index order.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    partial: BTreeMap<usize, PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.partial.is_empty()
    }

    /// Record one fragment. Any of the fields may be absent: the first
    /// fragment for an index usually carries id and name, continuation
    /// fragments only argument text.
    pub fn add_fragment(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let entry = self.partial.entry(index).or_default();
        if let Some(id) = id
            && !id.is_empty()
        {
            entry.id = id.to_string();
        }
        if let Some(name) = name
            && !name.is_empty()
        {
            entry.name = name.to_string();
        }
        if let Some(arguments) = arguments {
            entry.arguments.push_str(arguments);
        }
    }

    /// Drain the accumulated fragments into complete calls.
    pub fn finish(&mut self) -> Vec<ToolCall> {
        std::mem::take(&mut self.partial)
            .into_values()
            .map(|p| ToolCall::new(p.id, p.name, p.arguments))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_single_call_fragmented() {
        let mut asm = ToolCallAssembler::new();
        asm.add_fragment(0, Some("t1"), None, None);
        asm.add_fragment(0, None, Some("edit"), None);
        asm.add_fragment(0, None, None, Some("{\"file_path\":"));
        asm.add_fragment(0, None, None, Some("\"/a\""));
        asm.add_fragment(0, None, None, Some(",\"old_string\":\"x\",\"new_string\":\"y\"}"));

        let calls = asm.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "t1");
        assert_eq!(calls[0].function.name, "edit");
        assert_eq!(
            calls[0].function.arguments,
            "{\"file_path\":\"/a\",\"old_string\":\"x\",\"new_string\":\"y\"}"
        );
    }

    #[test]
    fn test_assembler_interleaved_indices() {
        let mut asm = ToolCallAssembler::new();
        asm.add_fragment(1, Some("t2"), Some("write"), Some("{\"file"));
        asm.add_fragment(0, Some("t1"), Some("read"), Some("{\"file_path\""));
        asm.add_fragment(1, None, None, Some("_path\":\"/b\"}"));
        asm.add_fragment(0, None, None, Some(":\"/a\"}"));

        let calls = asm.finish();
        assert_eq!(calls.len(), 2);
        // Index order, not arrival order
        assert_eq!(calls[0].id, "t1");
        assert_eq!(calls[0].function.arguments, "{\"file_path\":\"/a\"}");
        assert_eq!(calls[1].id, "t2");
        assert_eq!(calls[1].function.name, "write");
        assert_eq!(calls[1].function.arguments, "{\"file_path\":\"/b\"}");
    }

    #[test]
    fn test_assembler_finish_drains() {
        let mut asm = ToolCallAssembler::new();
        asm.add_fragment(0, Some("t1"), Some("ls"), Some("{}"));
        assert_eq!(asm.finish().len(), 1);
        assert!(asm.finish().is_empty());
        assert!(asm.is_empty());
    }

    #[test]
    fn test_usage_add() {
        let mut usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 20,
            total_tokens: 30,
        };
        usage.add(&TokenUsage {
            prompt_tokens: 5,
            completion_tokens: 7,
            total_tokens: 12,
        });
        assert_eq!(usage.prompt_tokens, 15);
        assert_eq!(usage.completion_tokens, 27);
        assert_eq!(usage.total_tokens, 42);
    }
}
