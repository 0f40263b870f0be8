//! Web Fetch Tool
//!
//! Plain HTTP(S) GET with a scheme whitelist, caller-provided headers and
//! a capped response body.

use super::{Result, Tool, ToolError, ToolExecutionContext};
use crate::message::ToolResult;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_TIMEOUT_MS: u64 = 120_000;
const MAX_BODY_BYTES: usize = 50_000;

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("opencoder/0.1")
                .build()
                .expect("failed to create HTTP client"),
        }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct WebFetchInput {
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    /// Timeout in milliseconds (default 30000, capped at 120000)
    #[serde(default)]
    timeout: Option<u64>,
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a http(s) URL with GET. Returns the status and up to 50000 bytes of the \
         response body. Default timeout 30s, maximum 120s."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "URL to fetch (http or https only)"
                },
                "headers": {
                    "type": "object",
                    "description": "Additional request headers",
                    "additionalProperties": {"type": "string"}
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default 30000, max 120000)",
                    "minimum": 1
                }
            },
            "required": ["url"]
        })
    }

    fn concurrency_safe(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, _context: &ToolExecutionContext) -> Result<ToolResult> {
        let input: WebFetchInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        if !input.url.starts_with("http://") && !input.url.starts_with("https://") {
            return Ok(ToolResult::failure(format!(
                "only http and https URLs are allowed, got {}",
                input.url
            )));
        }

        let timeout_ms = input
            .timeout
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .min(MAX_TIMEOUT_MS);

        let mut request = self
            .client
            .get(&input.url)
            .timeout(Duration::from_millis(timeout_ms));
        for (name, value) in &input.headers {
            request = request.header(name, value);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Ok(ToolResult::failure(format!("request failed: {e}"))),
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Ok(ToolResult::failure(format!("cannot read body: {e}"))),
        };

        let truncated = if body.len() > MAX_BODY_BYTES {
            let mut end = MAX_BODY_BYTES;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}\n... (body truncated)", &body[..end])
        } else {
            body
        };

        let rendered = format!("Status: {status}\n\n{truncated}");
        if status < 300 {
            Ok(ToolResult::success(rendered))
        } else {
            let mut result = ToolResult::failure(format!("http status {status}"));
            result.content = rendered;
            Ok(result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ToolExecutionContext {
        ToolExecutionContext::new(std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_rejects_non_http_schemes() {
        for url in ["ftp://example.com/x", "file:///etc/passwd", "gopher://x"] {
            let result = WebFetchTool::new()
                .execute(json!({"url": url}), &ctx())
                .await
                .unwrap();
            assert!(!result.success, "{url} should be rejected");
            assert!(result.error.as_ref().unwrap().contains("http"));
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_failure() {
        let result = WebFetchTool::new()
            .execute(
                json!({"url": "http://127.0.0.1:1/never", "timeout": 500}),
                &ctx(),
            )
            .await
            .unwrap();
        assert!(!result.success);
    }
}
