//! Agent-facing request/response types and errors.

use crate::message::Message;
use crate::provider::TokenUsage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("turn cancelled")]
    Cancelled,

    #[error(transparent)]
    Provider(#[from] crate::provider::ProviderError),

    #[error(transparent)]
    Context(#[from] crate::context::ContextError),

    #[error(transparent)]
    Prompt(#[from] crate::prompts::PromptError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// One user turn handed to the agent. The caller owns any sentinel
/// wrapping of `message` (e.g. `<user_query>` tags at the HTTP edge); the
/// core appends it verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: None,
            stream: false,
            metadata: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// A complete answer, or one streamed chunk of it. Streaming sends
/// partial chunks with `finished=false` and non-empty `response`; the
/// terminal chunk has `finished=true` with the aggregated usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    pub finished: bool,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

/// Loop state for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Thinking,
    ExecutingTools,
    Done,
    Error,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Thinking => "thinking",
            AgentStatus::ExecutingTools => "executing_tools",
            AgentStatus::Done => "done",
            AgentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Snapshot of a session as seen through the agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub session_id: String,
    pub status: AgentStatus,
    pub messages: Vec<Message>,
    pub compressed_history: String,
    pub active_tools: Vec<String>,
    pub last_activity: DateTime<Utc>,
}
