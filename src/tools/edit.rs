//! Edit File Tool
//!
//! Exact-substring replacement. The caller must provide text that matches
//! the file precisely, which proves it has read the current content.

use super::{Result, Tool, ToolError, ToolExecutionContext};
use crate::message::ToolResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub struct EditTool;

#[derive(Debug, Clone, Deserialize)]
pub(super) struct EditOperation {
    pub old_string: String,
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

#[derive(Debug, Deserialize)]
struct EditInput {
    file_path: String,
    #[serde(flatten)]
    operation: EditOperation,
}

/// Apply one edit to `content`. Pure so `multi_edit` can chain edits
/// in memory and abort without touching the file.
pub(super) fn apply_edit(content: &str, op: &EditOperation) -> std::result::Result<String, String> {
    if op.old_string == op.new_string {
        return Err("old_string and new_string are identical".to_string());
    }

    // Empty old_string appends at end of file.
    if op.old_string.is_empty() {
        return Ok(format!("{}\n{}", content, op.new_string));
    }

    let occurrences = content.matches(&op.old_string).count();
    if occurrences == 0 {
        let preview: String = op.old_string.chars().take(80).collect();
        return Err(format!(
            "old_string not found in file (searched for {preview:?}); \
             it must match exactly, including whitespace"
        ));
    }
    if occurrences > 1 && !op.replace_all {
        return Err(format!(
            "old_string matches {occurrences} locations; make it unique or set replace_all"
        ));
    }

    if op.replace_all {
        Ok(content.replace(&op.old_string, &op.new_string))
    } else {
        Ok(content.replacen(&op.old_string, &op.new_string, 1))
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace an exact substring in a file. old_string must match precisely and be \
         unique unless replace_all is set. An empty old_string appends new_string at \
         the end of the file."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to find (empty string appends at end of file)"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence instead of requiring uniqueness",
                    "default": false
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    fn concurrency_safe(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult> {
        let input: EditInput = serde_json::from_value(input)
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

        let new_content = match apply_edit(&content, &input.operation) {
            Ok(new_content) => new_content,
            Err(message) => return Ok(ToolResult::failure(message)),
        };

        if let Err(e) = tokio::fs::write(&path, &new_content).await {
            return Ok(ToolResult::failure(format!(
                "cannot write {}: {e}",
                path.display()
            )));
        }

        Ok(ToolResult::success(format!(
            "edited {}: {} -> {} bytes",
            path.display(),
            content.len(),
            new_content.len()
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
    async fn test_single_replacement() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "fn old() {}").unwrap();
        let result = EditTool
            .execute(
                json!({"file_path": "f.txt", "old_string": "old", "new_string": "new"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "fn new() {}"
        );
    }

    #[tokio::test]
    async fn test_non_unique_without_replace_all_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "aa aa").unwrap();
        let result = EditTool
            .execute(
                json!({"file_path": "f.txt", "old_string": "aa", "new_string": "bb"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("2 locations"));
        // File untouched
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "aa aa");
    }

    #[tokio::test]
    async fn test_replace_all() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "aa aa").unwrap();
        let result = EditTool
            .execute(
                json!({"file_path": "f.txt", "old_string": "aa", "new_string": "bb", "replace_all": true}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "bb bb");
    }

    #[tokio::test]
    async fn test_empty_old_string_appends() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "line1").unwrap();
        let result = EditTool
            .execute(
                json!({"file_path": "f.txt", "old_string": "", "new_string": "line2"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "line1\nline2"
        );
    }

    #[test]
    fn test_identical_strings_rejected() {
        let op = EditOperation {
            old_string: "same".to_string(),
            new_string: "same".to_string(),
            replace_all: false,
        };
        assert!(apply_edit("same text", &op).is_err());
    }

    #[test]
    fn test_not_found_is_error() {
        let op = EditOperation {
            old_string: "missing".to_string(),
            new_string: "x".to_string(),
            replace_all: false,
        };
        let err = apply_edit("content", &op).unwrap_err();
        assert!(err.contains("not found"));
    }
}
