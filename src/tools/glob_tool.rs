//! Glob Tool
//!
//! Filesystem glob returning the most recently modified matches first.

use super::{Result, Tool, ToolError, ToolExecutionContext};
use crate::message::ToolResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::SystemTime;

const MAX_MATCHES: usize = 10;

pub struct GlobTool;

#[derive(Debug, Deserialize)]
struct GlobInput {
    pattern: String,
    /// Directory the pattern is relative to (defaults to the working directory)
    #[serde(default)]
    path: Option<String>,
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g. \"src/**/*.rs\"). Returns up to 10 \
         matches, most recently modified first."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to match"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search in (defaults to the working directory)"
                }
            },
            "required": ["pattern"]
        })
    }

    fn concurrency_safe(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult> {
        let input: GlobInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        let root = match &input.path {
            Some(path) => context.resolve(path),
            None => context.working_dir.clone(),
        };
        let full_pattern = root.join(&input.pattern).to_string_lossy().into_owned();

        // glob's iterator is synchronous; the walk can touch many inodes
        let matches = tokio::task::spawn_blocking(move || -> std::result::Result<Vec<(std::path::PathBuf, SystemTime)>, String> {
            let paths = glob::glob(&full_pattern).map_err(|e| format!("invalid pattern: {e}"))?;
            let mut matches = Vec::new();
            for entry in paths.flatten() {
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                matches.push((entry, modified));
            }
            Ok(matches)
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let mut matches = match matches {
            Ok(matches) => matches,
            Err(message) => return Ok(ToolResult::failure(message)),
        };

        matches.sort_by(|a, b| b.1.cmp(&a.1));
        matches.truncate(MAX_MATCHES);

        if matches.is_empty() {
            return Ok(ToolResult::success("no files match the pattern".to_string()));
        }

        let listing: String = matches
            .iter()
            .map(|(path, _)| format!("{}\n", path.display()))
            .collect();
        Ok(ToolResult::success(listing))
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
    async fn test_matches_sorted_by_mtime_desc() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.rs"), "old").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(dir.path().join("new.rs"), "new").unwrap();

        let result = GlobTool
            .execute(json!({"pattern": "*.rs"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(result.success);
        let lines: Vec<&str> = result.content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("new.rs"));
        assert!(lines[1].ends_with("old.rs"));
    }

    #[tokio::test]
    async fn test_caps_at_ten_matches() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..15 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let result = GlobTool
            .execute(json!({"pattern": "*.txt"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.content.lines().count(), 10);
    }

    #[tokio::test]
    async fn test_no_matches_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let result = GlobTool
            .execute(json!({"pattern": "*.zig"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.content.contains("no files match"));
    }
}
