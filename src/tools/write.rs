//! Write File Tool
//!
//! Creates a new file. Refuses to overwrite: modifying an existing file
//! goes through `edit`, which forces a read-then-write discipline.

use super::{Result, Tool, ToolError, ToolExecutionContext};
use crate::message::ToolResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub struct WriteTool;

#[derive(Debug, Deserialize)]
struct WriteInput {
    file_path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Create a new file with the given content. Fails if the file already exists; \
         use the edit tool to modify existing files."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to create"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    fn concurrency_safe(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult> {
        let input: WriteInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        let path = context.resolve(&input.file_path);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(ToolResult::failure(format!(
                "{} already exists; read it and use edit to modify it",
                path.display()
            )));
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failure(format!(
                "cannot create directory {}: {e}",
                parent.display()
            )));
        }

        match tokio::fs::write(&path, &input.content).await {
            Ok(()) => Ok(ToolResult::success(format!(
                "created {} ({} bytes)",
                path.display(),
                input.content.len()
            ))),
            Err(e) => Ok(ToolResult::failure(format!(
                "cannot write {}: {e}",
                path.display()
            ))),
        }
    }
}
