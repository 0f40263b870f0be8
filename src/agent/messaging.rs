//! Public chat entry points.

use super::builder::Agent;
use super::types::{AgentError, AgentStatus, ChatRequest, ChatResponse, Result};
use crate::message::Message;
use crate::provider::TokenUsage;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Buffered chunks between the producer task and the consumer.
const STREAM_CHANNEL_CAPACITY: usize = 32;

impl Agent {
    /// Non-streaming chat turn.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.chat_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Non-streaming chat turn with caller-owned cancellation.
    pub async fn chat_with_cancellation(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatResponse> {
        let session_id = self.begin_turn(&request).await?;

        match self.run_turn(session_id, &cancel, None).await {
            Ok(turn) => Ok(ChatResponse {
                session_id: session_id.to_string(),
                response: turn.response,
                finished: true,
                usage: turn.usage,
                metadata: if turn.metadata.is_empty() {
                    None
                } else {
                    Some(turn.metadata)
                },
            }),
            Err(e) => {
                self.set_status(session_id, AgentStatus::Error);
                Err(e)
            }
        }
    }

    /// Streaming chat turn. Partial chunks arrive with `finished=false`;
    /// the final chunk has `finished=true` and aggregated usage, or an
    /// `error` entry in its metadata if the turn aborted. Dropping the
    /// stream cancels the turn.
    pub async fn chat_stream(
        self: Arc<Self>,
        request: ChatRequest,
    ) -> Result<ReceiverStream<ChatResponse>> {
        self.chat_stream_with_cancellation(request, CancellationToken::new())
            .await
    }

    pub async fn chat_stream_with_cancellation(
        self: Arc<Self>,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ReceiverStream<ChatResponse>> {
        let session_id = self.begin_turn(&request).await?;
        let (tx, rx) = mpsc::channel::<ChatResponse>(STREAM_CHANNEL_CAPACITY);

        let agent = self;
        tokio::spawn(async move {
            let terminal = match agent.run_turn(session_id, &cancel, Some(&tx)).await {
                Ok(turn) => ChatResponse {
                    session_id: session_id.to_string(),
                    // Content already went out incrementally; the terminal
                    // chunk only carries completion state and usage.
                    response: String::new(),
                    finished: true,
                    usage: turn.usage,
                    metadata: if turn.metadata.is_empty() {
                        None
                    } else {
                        Some(turn.metadata)
                    },
                },
                Err(e) => {
                    agent.set_status(session_id, AgentStatus::Error);
                    let mut metadata = BTreeMap::new();
                    metadata.insert("error".to_string(), e.to_string());
                    ChatResponse {
                        session_id: session_id.to_string(),
                        response: String::new(),
                        finished: true,
                        usage: TokenUsage::default(),
                        metadata: Some(metadata),
                    }
                }
            };
            let _ = tx.send(terminal).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Resolve the session, mark it thinking and append the user message.
    async fn begin_turn(&self, request: &ChatRequest) -> Result<Uuid> {
        let session_id = match &request.session_id {
            Some(raw) => Uuid::parse_str(raw)
                .map_err(|_| AgentError::InvalidSessionId(raw.clone()))?,
            None => Uuid::new_v4(),
        };
        let session_id = self.context.ensure_session(Some(session_id)).await;
        self.set_status(session_id, AgentStatus::Thinking);

        let mut message = Message::user(request.message.clone());
        if let Some(metadata) = &request.metadata {
            message.metadata.extend(metadata.clone());
        }
        self.context.add_message(session_id, message).await?;
        Ok(session_id)
    }
}
