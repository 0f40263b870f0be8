//! List Directory Tool

use super::{Result, Tool, ToolError, ToolExecutionContext};
use crate::message::ToolResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

pub struct LsTool;

#[derive(Debug, Deserialize)]
struct LsInput {
    /// Directory to list (defaults to the working directory)
    #[serde(default)]
    path: Option<String>,
    /// Glob patterns of entries to hide
    #[serde(default)]
    ignore: Vec<String>,
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1}MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes}B")
    }
}

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        "ls"
    }

    fn description(&self) -> &str {
        "List a directory. Directories get a trailing slash, files a size annotation. \
         Optional ignore patterns hide matching entries."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (defaults to the working directory)"
                },
                "ignore": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Glob patterns of entries to hide"
                }
            }
        })
    }

    fn concurrency_safe(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult> {
        let input: LsInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        let dir = match &input.path {
            Some(path) => context.resolve(path),
            None => context.working_dir.clone(),
        };

        let mut ignore_patterns = Vec::new();
        for raw in &input.ignore {
            match glob::Pattern::new(raw) {
                Ok(pattern) => ignore_patterns.push(pattern),
                Err(e) => {
                    return Ok(ToolResult::failure(format!(
                        "invalid ignore pattern {raw:?}: {e}"
                    )));
                }
            }
        }

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                return Ok(ToolResult::failure(format!(
                    "cannot list {}: {e}",
                    dir.display()
                )));
            }
        };

        let mut rows: Vec<(bool, String, u64)> = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if ignore_patterns.iter().any(|p| p.matches(&name)) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };
            rows.push((metadata.is_dir(), name, metadata.len()));
        }

        // Directories first, then files, both alphabetical
        rows.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        if rows.is_empty() {
            return Ok(ToolResult::success(format!("{} is empty", dir.display())));
        }

        let mut output = format!("{}:\n", dir.display());
        for (is_dir, name, size) in rows {
            if is_dir {
                output.push_str(&format!("  {name}/\n"));
            } else {
                output.push_str(&format!("  {name} ({})\n", format_size(size)));
            }
        }
        Ok(ToolResult::success(output))
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
    async fn test_lists_dirs_before_files_with_sizes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zdir")).unwrap();
        std::fs::write(dir.path().join("afile.txt"), "12345").unwrap();

        let result = LsTool.execute(json!({}), &ctx(dir.path())).await.unwrap();
        assert!(result.success);
        let lines: Vec<&str> = result.content.lines().collect();
        assert!(lines[1].contains("zdir/"));
        assert!(lines[2].contains("afile.txt (5B)"));
    }

    #[tokio::test]
    async fn test_ignore_patterns() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("keep.rs"), "x").unwrap();
        std::fs::write(dir.path().join("skip.log"), "x").unwrap();

        let result = LsTool
            .execute(json!({"ignore": ["*.log"]}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(result.content.contains("keep.rs"));
        assert!(!result.content.contains("skip.log"));
    }

    #[tokio::test]
    async fn test_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = LsTool
            .execute(json!({"path": "absent"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(12), "12B");
        assert_eq!(format_size(2048), "2.0KB");
        assert_eq!(format_size(3_145_728), "3.0MB");
    }
}
