//! Read File Tool
//!
//! Reads a file with optional offset/limit and returns line-numbered
//! output, which keeps later `edit` calls anchored to exact content.

use super::{Result, Tool, ToolError, ToolExecutionContext};
use crate::message::ToolResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_LINE_LIMIT: usize = 2000;

pub struct ReadTool;

#[derive(Debug, Deserialize)]
struct ReadInput {
    file_path: String,
    /// 0-based line offset to start from
    #[serde(default)]
    offset: Option<usize>,
    /// Maximum number of lines to return
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a file from the filesystem. Output is line-numbered. Supports an optional \
         line offset and limit for large files."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (0-based)",
                    "minimum": 0
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read",
                    "minimum": 1
                }
            },
            "required": ["file_path"]
        })
    }

    fn concurrency_safe(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult> {
        let input: ReadInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        let path = context.resolve(&input.file_path);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                return Ok(ToolResult::failure(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        let offset = input.offset.unwrap_or(0);
        let limit = input.limit.unwrap_or(DEFAULT_LINE_LIMIT);

        let mut output = String::new();
        let mut shown = 0usize;
        for (i, line) in content.lines().enumerate().skip(offset).take(limit) {
            output.push_str(&format!("{:>6}→{}\n", i + 1, line));
            shown += 1;
        }

        if shown == 0 && offset > 0 {
            return Ok(ToolResult::failure(format!(
                "offset {} is past the end of {} ({} lines)",
                offset,
                path.display(),
                content.lines().count()
            )));
        }

        Ok(ToolResult::success(output))
    }
}
