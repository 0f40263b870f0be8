//! Loop helpers: prompt variable assembly and stream draining.

use super::types::{AgentError, ChatResponse, Result};
use crate::message::Role;
use crate::provider::{LLMResponse, ProviderStream, TokenUsage};
use crate::tools::DEFAULT_IGNORED_DIRS;
use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Cap on the workspace listing embedded in the user_info prompt.
const FILE_STRUCTURE_MAX_ENTRIES: usize = 200;

/// Idle gap between stream events after which the connection counts as
/// dropped. Some providers hang silently instead of closing.
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounded breadth-first listing of the working directory, one relative
/// path per line, directories marked with a trailing slash.
pub(super) fn build_file_structure(root: &Path) -> String {
    let mut lines = Vec::new();
    let mut queue = VecDeque::from([root.to_path_buf()]);

    while let Some(dir) = queue.pop_front() {
        if lines.len() >= FILE_STRUCTURE_MAX_ENTRIES {
            lines.push("... (listing truncated)".to_string());
            break;
        }
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut children: Vec<_> = entries.flatten().collect();
        children.sort_by_key(|e| e.file_name());

        for entry in children {
            if lines.len() >= FILE_STRUCTURE_MAX_ENTRIES {
                break;
            }
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                if DEFAULT_IGNORED_DIRS.contains(&name) || name.starts_with('.') {
                    continue;
                }
                lines.push(format!("{}/", relative.display()));
                queue.push_back(path);
            } else {
                lines.push(relative.display().to_string());
            }
        }
    }

    lines.join("\n")
}

/// Variables for the `user_info` prompt.
pub(super) fn user_info_vars(working_dir: &Path) -> serde_json::Value {
    json!({
        "os": std::env::consts::OS,
        "pwd": working_dir.display().to_string(),
        "shell": std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
        "date": Utc::now().to_rfc3339(),
        "file_structure": build_file_structure(working_dir),
    })
}

/// Drain a provider stream into a complete response, forwarding content
/// deltas to the optional sink as partial `ChatResponse` chunks. A closed
/// sink (consumer went away) behaves like cancellation.
pub(super) async fn drain_stream(
    mut stream: ProviderStream,
    cancel: &CancellationToken,
    mut forward: Option<(&mpsc::Sender<ChatResponse>, &str)>,
) -> Result<LLMResponse> {
    let mut id = String::new();
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut usage = TokenUsage::default();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            next = tokio::time::timeout(STREAM_IDLE_TIMEOUT, stream.next()) => next,
        };

        let item = match next {
            Ok(item) => item,
            Err(_elapsed) => {
                return Err(AgentError::Provider(
                    crate::provider::ProviderError::Stream(format!(
                        "no stream event for {}s, treating connection as dropped",
                        STREAM_IDLE_TIMEOUT.as_secs()
                    )),
                ));
            }
        };

        let chunk = match item {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(AgentError::Provider(e)),
            None => break,
        };

        if let Some(chunk_id) = chunk.id
            && id.is_empty()
        {
            id = chunk_id;
        }
        if !chunk.content_delta.is_empty() {
            content.push_str(&chunk.content_delta);
            if let Some((tx, session_id)) = forward.as_mut() {
                let partial = ChatResponse {
                    session_id: session_id.to_string(),
                    response: chunk.content_delta,
                    finished: false,
                    usage: TokenUsage::default(),
                    metadata: None,
                };
                if tx.send(partial).await.is_err() {
                    return Err(AgentError::Cancelled);
                }
            }
        }
        if !chunk.tool_calls.is_empty() {
            tool_calls.extend(chunk.tool_calls);
        }
        if let Some(chunk_usage) = chunk.usage {
            usage = chunk_usage;
        }
    }

    Ok(LLMResponse {
        id,
        content,
        role: Role::Assistant,
        tool_calls,
        usage,
    })
}

/// Human-readable rendering of a tool result for the `tool` message fed
/// back to the model.
pub(super) fn render_tool_result(name: &str, result: &crate::message::ToolResult) -> String {
    format!(
        "Tool: {}\nSuccess: {}\nError: {}\nOutput:\n{}",
        name,
        result.success,
        result.error.as_deref().unwrap_or(""),
        result.content
    )
}
