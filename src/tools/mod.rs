//! Tool System
//!
//! Named, parameterized operations the model may request. The registry is
//! built once from configuration; the engine executes batches of calls
//! honoring per-tool concurrency safety and timeouts.

pub mod error;
mod engine;

mod bash;
mod edit;
mod glob_tool;
mod grep;
mod ls;
mod multi_edit;
mod read;
mod todo;
mod web_fetch;
mod web_search;
mod write;

pub use bash::BashTool;
pub use edit::EditTool;
pub use engine::ToolEngine;
pub use error::{Result, ToolError};
pub use glob_tool::GlobTool;
pub use grep::GrepTool;
pub use ls::LsTool;
pub use multi_edit::MultiEditTool;
pub use read::ReadTool;
pub use todo::{TodoReadTool, TodoWriteTool};
pub use web_fetch::WebFetchTool;
pub use web_search::WebSearchTool;
pub use write::WriteTool;

use crate::message::ToolResult;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Directory names excluded by default from workspace walks (grep, the
/// file_structure listing). VCS internals and build output.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[
    ".git", ".svn", ".hg", "node_modules", "target", "build", "dist", "vendor", ".idea",
    ".vscode", "__pycache__",
];

/// Per-call execution context handed to every tool.
#[derive(Clone)]
pub struct ToolExecutionContext {
    /// Directory relative paths resolve against.
    pub working_dir: PathBuf,
    /// Cooperative cancellation from the caller.
    pub cancel: CancellationToken,
}

impl ToolExecutionContext {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve a possibly-relative path against the working directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = PathBuf::from(path);
        if p.is_absolute() {
            p
        } else {
            self.working_dir.join(p)
        }
    }
}

/// A single executable tool.
///
/// `execute` returns `Ok` for both successful and failed tool runs (the
/// distinction lives in the `ToolResult`); `Err` is reserved for
/// infrastructure problems and is converted to a failed result by the
/// engine. A tool's `concurrency_safe` answer must be constant: the
/// registry caches it at registration.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON-schema shaped parameter description the model reads.
    fn input_schema(&self) -> Value;

    /// Whether this tool's side effects permit parallel execution with
    /// other concurrency-safe tools.
    fn concurrency_safe(&self) -> bool;

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult>;
}

struct RegisteredTool {
    tool: Arc<dyn Tool>,
    concurrency_safe: bool,
}

/// Immutable-after-construction tool table.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let concurrency_safe = tool.concurrency_safe();
        self.tools.insert(
            tool.name().to_string(),
            RegisteredTool {
                tool,
                concurrency_safe,
            },
        );
    }

    /// Build a registry with the built-in tools named in configuration.
    /// Unknown names are logged and skipped.
    pub fn from_enabled(enabled: &[String]) -> Self {
        let mut registry = Self::new();
        for name in enabled {
            let tool: Option<Arc<dyn Tool>> = match name.as_str() {
                "read" => Some(Arc::new(ReadTool)),
                "write" => Some(Arc::new(WriteTool)),
                "edit" => Some(Arc::new(EditTool)),
                "multi_edit" => Some(Arc::new(MultiEditTool)),
                "glob" => Some(Arc::new(GlobTool)),
                "grep" => Some(Arc::new(GrepTool)),
                "ls" => Some(Arc::new(LsTool)),
                "bash" => Some(Arc::new(BashTool)),
                "todo_read" => Some(Arc::new(TodoReadTool)),
                "todo_write" => Some(Arc::new(TodoWriteTool)),
                "web_search" => Some(Arc::new(WebSearchTool::new())),
                "web_fetch" => Some(Arc::new(WebFetchTool::new())),
                other => {
                    tracing::warn!("unknown tool \"{}\" in tools.enabled_tools, skipping", other);
                    None
                }
            };
            if let Some(tool) = tool {
                registry.register(tool);
            }
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name).map(|r| &r.tool)
    }

    /// Cached concurrency-safety answer from registration time.
    pub fn is_concurrency_safe(&self, name: &str) -> Option<bool> {
        self.tools.get(name).map(|r| r.concurrency_safe)
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// Definitions for every registered tool, sorted by name so request
    /// payloads are stable.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|r| ToolDefinition {
                name: r.tool.name().to_string(),
                description: r.tool.description().to_string(),
                parameters: r.tool.input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

/// Default per-call timeout when `tools.timeouts` has no entry.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);
