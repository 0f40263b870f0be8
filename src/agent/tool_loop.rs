//! The reason-act cycle for a single turn.

use super::builder::Agent;
use super::helpers;
use super::types::{AgentError, AgentStatus, ChatResponse, Result};
use crate::message::Message;
use crate::provider::{LLMRequest, TokenUsage};
use serde_json::json;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub(super) struct TurnResult {
    pub response: String,
    pub usage: TokenUsage,
    pub metadata: BTreeMap<String, String>,
}

impl Agent {
    /// Run the loop for an already-appended user message. `sink` receives
    /// partial content while streaming; `None` means non-streaming.
    ///
    /// Reaching the loop cap is not a failure: the last assistant content
    /// is returned with a `loop_exhausted` marker so the caller sees the
    /// model's final attempt.
    pub(super) async fn run_turn(
        &self,
        session_id: Uuid,
        cancel: &CancellationToken,
        sink: Option<&mpsc::Sender<ChatResponse>>,
    ) -> Result<TurnResult> {
        let mut total_usage = TokenUsage::default();
        let mut metadata = BTreeMap::new();
        let mut last_text = String::new();

        if self.max_loops == 0 {
            // Pure configuration choice: no LLM call, empty success.
            self.set_status(session_id, AgentStatus::Done);
            return Ok(TurnResult {
                response: String::new(),
                usage: total_usage,
                metadata,
            });
        }

        let tool_definitions = self.engine.definitions();
        let session_key = session_id.to_string();
        let runtime = self.provider.config();

        for loop_index in 0..self.max_loops {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            self.set_status(session_id, AgentStatus::Thinking);

            // Compose [system, user_info, compressed summary?, ...history]
            let system_prompt = self.prompts.get_with_data(
                "system",
                json!({"model_provider": self.provider.provider()}),
            )?;
            let user_info = self
                .prompts
                .get_with_data("user_info", helpers::user_info_vars(&self.working_dir))?;

            let session = self.context.get_session_context(session_id).await;
            let mut messages = Vec::new();
            messages.push(Message::system(system_prompt));
            messages.push(Message::system(user_info));
            if let Some(session) = &session
                && !session.compressed_history.is_empty()
            {
                messages.push(Message::system(format!(
                    "Summary of the earlier conversation:\n{}",
                    session.compressed_history
                )));
            }
            messages.extend(session.map(|s| s.messages).unwrap_or_default());

            let request = LLMRequest::new(messages)
                .with_tools(tool_definitions.clone())
                .with_max_tokens(runtime.max_tokens);

            let response = match sink {
                None => self.provider.chat(request).await?,
                Some(tx) => {
                    let stream = self
                        .provider
                        .chat_stream(request.with_streaming())
                        .await?;
                    helpers::drain_stream(stream, cancel, Some((tx, &session_key))).await?
                }
            };

            total_usage.add(&response.usage);
            tracing::debug!(
                "loop {}: {} chars, {} tool calls",
                loop_index,
                response.content.len(),
                response.tool_calls.len()
            );

            // Persist the assistant turn before anything else can fail.
            let assistant = Message::assistant_with_tool_calls(
                response.content.clone(),
                response.tool_calls.clone(),
            );
            self.context.add_message(session_id, assistant).await?;
            last_text = response.content;

            if response.tool_calls.is_empty() {
                self.set_status(session_id, AgentStatus::Done);
                return Ok(TurnResult {
                    response: last_text,
                    usage: total_usage,
                    metadata,
                });
            }

            self.set_status(session_id, AgentStatus::ExecutingTools);
            self.set_active_tools(
                session_id,
                response
                    .tool_calls
                    .iter()
                    .map(|c| c.function.name.clone())
                    .collect(),
            );

            let results = self
                .engine
                .execute_batch(&response.tool_calls, cancel.clone())
                .await;

            // One tool message per result, in emission order, linked to
            // the originating call. Failures go back to the model too.
            for (call, result) in response.tool_calls.iter().zip(results.iter()) {
                let rendered = helpers::render_tool_result(&call.function.name, result);
                let message =
                    Message::tool(rendered, &call.id, &call.function.name, result.success);
                self.context.add_message(session_id, message).await?;
            }

            if cancel.is_cancelled() {
                // Completed calls are already appended; the turn itself
                // still surfaces the cancellation.
                return Err(AgentError::Cancelled);
            }
        }

        tracing::warn!(
            "session {} hit the loop cap of {}, returning last assistant content",
            session_id,
            self.max_loops
        );
        metadata.insert("loop_exhausted".to_string(), "true".to_string());
        self.set_status(session_id, AgentStatus::Done);
        Ok(TurnResult {
            response: last_text,
            usage: total_usage,
            metadata,
        })
    }
}
