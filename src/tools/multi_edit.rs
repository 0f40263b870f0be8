//! Multi-Edit Tool
//!
//! Applies a sequence of exact-substring edits to one file in order. The
//! whole batch is atomic: any failure aborts before the file is written.

use super::edit::{EditOperation, apply_edit};
use super::{Result, Tool, ToolError, ToolExecutionContext};
use crate::message::ToolResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub struct MultiEditTool;

#[derive(Debug, Deserialize)]
struct MultiEditInput {
    file_path: String,
    edits: Vec<EditOperation>,
}

#[async_trait]
impl Tool for MultiEditTool {
    fn name(&self) -> &str {
        "multi_edit"
    }

    fn description(&self) -> &str {
        "Apply several exact-substring edits to a single file in order. Each edit has \
         the same semantics as the edit tool. The batch aborts on the first failing \
         edit and leaves the file unchanged."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to edit"
                },
                "edits": {
                    "type": "array",
                    "description": "Edits applied in order",
                    "items": {
                        "type": "object",
                        "properties": {
                            "old_string": {"type": "string"},
                            "new_string": {"type": "string"},
                            "replace_all": {"type": "boolean", "default": false}
                        },
                        "required": ["old_string", "new_string"]
                    },
                    "minItems": 1
                }
            },
            "required": ["file_path", "edits"]
        })
    }

    fn concurrency_safe(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult> {
        let input: MultiEditInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        if input.edits.is_empty() {
            return Ok(ToolResult::failure("edits must not be empty"));
        }

        let path = context.resolve(&input.file_path);
        let original = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(ToolResult::failure(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        let mut content = original;
        for (i, op) in input.edits.iter().enumerate() {
            match apply_edit(&content, op) {
                Ok(next) => content = next,
                Err(message) => {
                    return Ok(ToolResult::failure(format!(
                        "edit {} of {} failed: {message}",
                        i + 1,
                        input.edits.len()
                    )));
                }
            }
        }

        if let Err(e) = tokio::fs::write(&path, &content).await {
            return Ok(ToolResult::failure(format!(
                "cannot write {}: {e}",
                path.display()
            )));
        }

        Ok(ToolResult::success(format!(
            "applied {} edits to {}",
            input.edits.len(),
            path.display()
        )))
    }
}
