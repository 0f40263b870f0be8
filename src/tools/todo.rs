//! Todo Tools
//!
//! A per-workspace JSON task list the model maintains across turns. The
//! store is file-backed, keyed by a hash of the workspace path so projects
//! never see each other's lists, and guarded by its own process-wide lock.

use super::{Result, Tool, ToolExecutionContext};
use crate::config::opencoder_home;
use crate::message::ToolResult;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Dedicated lock for the todo files; never shared with the engine's
/// synchronization.
static TODO_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    pub status: TodoStatus,
    pub priority: TodoPriority,
}

/// Store file for a workspace: `~/.opencoder/todos/<hash>.json`.
fn store_path(workspace: &Path) -> PathBuf {
    let bytes = workspace.to_string_lossy();
    let hash = bytes
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
    opencoder_home().join("todos").join(format!("{hash:016x}.json"))
}

async fn load_items(workspace: &Path) -> std::io::Result<Vec<TodoItem>> {
    let path = store_path(workspace);
    match tokio::fs::read_to_string(&path).await {
        Ok(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

fn render_items(items: &[TodoItem]) -> String {
    if items.is_empty() {
        return "no todos".to_string();
    }
    let mut output = String::new();
    for item in items {
        let marker = match item.status {
            TodoStatus::Pending => "[ ]",
            TodoStatus::InProgress => "[~]",
            TodoStatus::Completed => "[x]",
            TodoStatus::Cancelled => "[-]",
        };
        let priority = match item.priority {
            TodoPriority::High => "high",
            TodoPriority::Medium => "medium",
            TodoPriority::Low => "low",
        };
        output.push_str(&format!("{marker} ({priority}) {} — {}\n", item.id, item.content));
    }
    output
}

pub struct TodoReadTool;

#[async_trait]
impl Tool for TodoReadTool {
    fn name(&self) -> &str {
        "todo_read"
    }

    fn description(&self) -> &str {
        "Read the current task list for this workspace."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    fn concurrency_safe(&self) -> bool {
        true
    }

    async fn execute(&self, _input: Value, context: &ToolExecutionContext) -> Result<ToolResult> {
        let _guard = TODO_LOCK.lock().await;
        match load_items(&context.working_dir).await {
            Ok(items) => Ok(ToolResult::success(render_items(&items))),
            Err(e) => Ok(ToolResult::failure(format!("cannot read todo list: {e}"))),
        }
    }
}

pub struct TodoWriteTool;

#[derive(Debug, Deserialize)]
struct TodoWriteInput {
    todos: Vec<TodoItem>,
}

#[async_trait]
impl Tool for TodoWriteTool {
    fn name(&self) -> &str {
        "todo_write"
    }

    fn description(&self) -> &str {
        "Replace the workspace task list. Requires at least 2 items; status must be one \
         of pending/in_progress/completed/cancelled and priority one of high/medium/low."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "minItems": 2,
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "content": {"type": "string"},
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed", "cancelled"]
                            },
                            "priority": {
                                "type": "string",
                                "enum": ["high", "medium", "low"]
                            }
                        },
                        "required": ["id", "content", "status", "priority"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    fn concurrency_safe(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult> {
        // Enum validation happens in deserialization; report it as a tool
        // failure so the model can correct itself.
        let input: TodoWriteInput = match serde_json::from_value(input) {
            Ok(input) => input,
            Err(e) => return Ok(ToolResult::failure(format!("invalid todo list: {e}"))),
        };

        if input.todos.len() < 2 {
            return Ok(ToolResult::failure(
                "todo list must contain at least 2 items",
            ));
        }

        let _guard = TODO_LOCK.lock().await;
        let path = store_path(&context.working_dir);
        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failure(format!("cannot create todo dir: {e}")));
        }

        let json = serde_json::to_string_pretty(&input.todos)?;
        if let Err(e) = tokio::fs::write(&path, json).await {
            return Ok(ToolResult::failure(format!("cannot write todo list: {e}")));
        }

        Ok(ToolResult::success(format!(
            "saved {} todos\n{}",
            input.todos.len(),
            render_items(&input.todos)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(dir: &std::path::Path) -> ToolExecutionContext {
        ToolExecutionContext::new(dir.to_path_buf())
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let workspace = tempfile::tempdir().unwrap();
        let context = ctx(workspace.path());

        let write = TodoWriteTool
            .execute(
                json!({"todos": [
                    {"id": "1", "content": "write tests", "status": "in_progress", "priority": "high"},
                    {"id": "2", "content": "review", "status": "pending", "priority": "low"},
                ]}),
                &context,
            )
            .await
            .unwrap();
        assert!(write.success, "{:?}", write.error);

        let read = TodoReadTool.execute(json!({}), &context).await.unwrap();
        assert!(read.success);
        assert!(read.content.contains("[~] (high) 1 — write tests"));
        assert!(read.content.contains("[ ] (low) 2 — review"));
    }

    #[tokio::test]
    async fn test_write_requires_two_items() {
        let workspace = tempfile::tempdir().unwrap();
        let result = TodoWriteTool
            .execute(
                json!({"todos": [
                    {"id": "1", "content": "only one", "status": "pending", "priority": "high"},
                ]}),
                &ctx(workspace.path()),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("at least 2"));
    }

    #[tokio::test]
    async fn test_invalid_status_rejected() {
        let workspace = tempfile::tempdir().unwrap();
        let result = TodoWriteTool
            .execute(
                json!({"todos": [
                    {"id": "1", "content": "a", "status": "doing", "priority": "high"},
                    {"id": "2", "content": "b", "status": "pending", "priority": "medium"},
                ]}),
                &ctx(workspace.path()),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("invalid todo list"));
    }

    #[tokio::test]
    async fn test_workspaces_are_isolated() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        assert_ne!(store_path(first.path()), store_path(second.path()));
    }

    #[tokio::test]
    async fn test_read_empty_workspace() {
        let workspace = tempfile::tempdir().unwrap();
        let result = TodoReadTool
            .execute(json!({}), &ctx(workspace.path()))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.content, "no todos");
    }
}
