//! Tool Engine
//!
//! Executes a batch of tool calls against the registry. Concurrency-safe
//! tools run in parallel under a global semaphore; everything else runs
//! sequentially in call order. Results always come back at the index of
//! the call that produced them.

use super::{
    DEFAULT_TOOL_TIMEOUT, Tool, ToolExecutionContext, ToolRegistry,
};
use crate::config::ToolsConfig;
use crate::message::{ToolCall, ToolResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

const CANCELLED_ERROR: &str = "context cancelled";

pub struct ToolEngine {
    registry: Arc<ToolRegistry>,
    semaphore: Arc<Semaphore>,
    working_dir: PathBuf,
    default_timeout: Duration,
    timeouts: HashMap<String, Duration>,
}

impl ToolEngine {
    pub fn new(registry: Arc<ToolRegistry>, config: &ToolsConfig, working_dir: PathBuf) -> Self {
        let timeouts = config
            .timeouts
            .iter()
            .map(|(name, ms)| (name.clone(), Duration::from_millis(*ms)))
            .collect();
        Self {
            registry,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            working_dir,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            timeouts,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn definitions(&self) -> Vec<crate::provider::ToolDefinition> {
        self.registry.definitions()
    }

    fn timeout_for(&self, name: &str) -> Duration {
        self.timeouts
            .get(name)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Execute `calls`, returning one result per call at the same index.
    ///
    /// Unknown tools fail in place. The parallel group is bounded by the
    /// global semaphore with cancellable acquisition; the sequential group
    /// short-circuits once the token fires. Panics and deadline expiry
    /// become failed results, never engine crashes.
    pub async fn execute_batch(
        &self,
        calls: &[ToolCall],
        cancel: CancellationToken,
    ) -> Vec<ToolResult> {
        let mut results: Vec<Option<ToolResult>> = calls.iter().map(|_| None).collect();
        let mut parallel: Vec<usize> = Vec::new();
        let mut sequential: Vec<usize> = Vec::new();

        for (i, call) in calls.iter().enumerate() {
            match self.registry.is_concurrency_safe(&call.function.name) {
                None => {
                    results[i] = Some(ToolResult::failure(format!(
                        "tool {} not found",
                        call.function.name
                    )));
                }
                Some(true) => parallel.push(i),
                Some(false) => sequential.push(i),
            }
        }

        // Parallel group: spawned tasks gated by the semaphore. A task
        // still waiting for a permit when cancellation fires reports
        // "context cancelled" without ever running the tool.
        let mut handles = Vec::with_capacity(parallel.len());
        for i in parallel {
            let call = calls[i].clone();
            let tool = self
                .registry
                .get(&call.function.name)
                .cloned()
                .expect("partitioned call resolves");
            let timeout = self.timeout_for(&call.function.name);
            let semaphore = Arc::clone(&self.semaphore);
            let cancel = cancel.clone();
            let context =
                ToolExecutionContext::new(self.working_dir.clone()).with_cancel(cancel.clone());

            let handle = tokio::spawn(async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => {
                        return ToolResult::failure(CANCELLED_ERROR);
                    }
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return ToolResult::failure(CANCELLED_ERROR),
                    },
                };
                run_single(tool, call, context, timeout).await
            });
            handles.push((i, handle));
        }

        for (i, handle) in handles {
            results[i] = Some(match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("tool task at index {} panicked: {}", i, e);
                    ToolResult::failure(format!("tool panicked: {e}"))
                }
            });
        }

        // Sequential group: original order, after the parallel group has
        // drained. Each call checks cancellation first.
        for i in sequential {
            if cancel.is_cancelled() {
                results[i] = Some(ToolResult::failure(CANCELLED_ERROR));
                continue;
            }

            let call = calls[i].clone();
            let tool = self
                .registry
                .get(&call.function.name)
                .cloned()
                .expect("partitioned call resolves");
            let timeout = self.timeout_for(&call.function.name);
            let context =
                ToolExecutionContext::new(self.working_dir.clone()).with_cancel(cancel.clone());

            let handle = tokio::spawn(run_single(tool, call, context, timeout));
            results[i] = Some(match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!("tool task at index {} panicked: {}", i, e);
                    ToolResult::failure(format!("tool panicked: {e}"))
                }
            });
        }

        results
            .into_iter()
            .map(|r| r.expect("every index filled"))
            .collect()
    }
}

/// Parse arguments, apply the per-call deadline, convert every failure
/// shape into a `ToolResult`.
async fn run_single(
    tool: Arc<dyn Tool>,
    call: ToolCall,
    context: ToolExecutionContext,
    timeout: Duration,
) -> ToolResult {
    let raw = call.function.arguments.trim();
    let input: serde_json::Value = if raw.is_empty() {
        serde_json::json!({})
    } else {
        match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                return ToolResult::failure(format!(
                    "invalid arguments for tool {}: {e}",
                    call.function.name
                ));
            }
        }
    };

    tracing::debug!("executing tool {} (call {})", call.function.name, call.id);
    match tokio::time::timeout(timeout, tool.execute(input, &context)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => ToolResult::failure(e.to_string()),
        Err(_) => ToolResult::failure(format!(
            "tool {} timed out after {}s",
            call.function.name,
            timeout.as_secs()
        )),
    }
}
