//! Bash Tool
//!
//! Runs a shell command in the working directory with a hard timeout and
//! capped output capture. A small denylist blocks the obviously
//! catastrophic commands before they reach the shell.

use super::{Result, Tool, ToolError, ToolExecutionContext};
use crate::message::ToolResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const MAX_TIMEOUT_MS: u64 = 600_000;
const MAX_CAPTURE_BYTES: usize = 30_000;

const DENYLIST: &[&str] = &["rm -rf /", "rm -rf /*", ":(){ :|:& };:", "mkfs", "> /dev/sda"];

pub struct BashTool;

#[derive(Debug, Deserialize)]
struct BashInput {
    command: String,
    /// Timeout in milliseconds (default 120000, capped at 600000)
    #[serde(default)]
    timeout: Option<u64>,
}

fn truncate_capture(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= MAX_CAPTURE_BYTES {
        text.into_owned()
    } else {
        let mut end = MAX_CAPTURE_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}\n... (output truncated)", &text[..end])
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the working directory. Captures stdout and stderr \
         (truncated to 30000 bytes each) and reports the exit code. Default timeout \
         120s, maximum 600s."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default 120000, max 600000)",
                    "minimum": 1
                }
            },
            "required": ["command"]
        })
    }

    fn concurrency_safe(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult> {
        let input: BashInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        let command = input.command.trim();
        if command.is_empty() {
            return Ok(ToolResult::failure("command must not be empty"));
        }
        if DENYLIST.iter().any(|blocked| command.contains(blocked)) {
            return Ok(ToolResult::failure(format!(
                "command blocked by safety rules: {command}"
            )));
        }

        let timeout_ms = input
            .timeout
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .min(MAX_TIMEOUT_MS);
        let timeout = Duration::from_millis(timeout_ms);

        let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
        let child = match tokio::process::Command::new(&shell)
            .arg("-c")
            .arg(command)
            .current_dir(&context.working_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return Ok(ToolResult::failure(format!("cannot spawn {shell}: {e}")));
            }
        };

        // kill_on_drop reaps the child when the wait future is dropped on
        // the cancellation branch.
        let wait = tokio::time::timeout(timeout, child.wait_with_output());
        let output = tokio::select! {
            _ = context.cancel.cancelled() => {
                return Ok(ToolResult::failure("context cancelled"));
            }
            result = wait => match result {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return Ok(ToolResult::failure(format!("command failed: {e}"))),
                Err(_) => {
                    return Ok(ToolResult::failure(format!(
                        "command timed out after {}s",
                        timeout.as_secs()
                    )));
                }
            },
        };

        let stdout = truncate_capture(&output.stdout);
        let stderr = truncate_capture(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);

        let mut rendered = format!("Exit code: {exit_code}\n");
        if !stdout.is_empty() {
            rendered.push_str(&format!("Stdout:\n{stdout}\n"));
        }
        if !stderr.is_empty() {
            rendered.push_str(&format!("Stderr:\n{stderr}\n"));
        }

        if output.status.success() {
            Ok(ToolResult::success(rendered))
        } else {
            let mut result = ToolResult::failure(format!("command exited with code {exit_code}"));
            result.content = rendered;
            Ok(result)
        }
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
    async fn test_captures_stdout_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let result = BashTool
            .execute(json!({"command": "echo hello"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.content.contains("Exit code: 0"));
        assert!(result.content.contains("hello"));
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let result = BashTool
            .execute(json!({"command": "ls"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(result.content.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure_with_output() {
        let dir = tempfile::tempdir().unwrap();
        let result = BashTool
            .execute(
                json!({"command": "echo oops >&2; exit 3"}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("code 3"));
        assert!(result.content.contains("oops"));
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let dir = tempfile::tempdir().unwrap();
        let start = std::time::Instant::now();
        let result = BashTool
            .execute(
                json!({"command": "sleep 30", "timeout": 100}),
                &ctx(dir.path()),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_denylist_blocks_catastrophic_commands() {
        let dir = tempfile::tempdir().unwrap();
        let result = BashTool
            .execute(json!({"command": "rm -rf /"}), &ctx(dir.path()))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.error.as_ref().unwrap().contains("blocked"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_command() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = tokio_util::sync::CancellationToken::new();
        let context = ctx(dir.path()).with_cancel(cancel.clone());
        let task = tokio::spawn(async move {
            BashTool
                .execute(json!({"command": "sleep 30"}), &context)
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let result = task.await.unwrap().unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("context cancelled"));
    }
}
