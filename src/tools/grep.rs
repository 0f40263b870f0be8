//! Grep Tool
//!
//! Recursive regex content search: a breadth-first walk collects candidate
//! files, a small worker pool scans them with a regex compiled once, and
//! the capped result list is ordered by file recency then line number.

use super::{DEFAULT_IGNORED_DIRS, Result, Tool, ToolError, ToolExecutionContext};
use crate::message::ToolResult;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

const DEFAULT_MAX_RESULTS: usize = 10;
const WORKER_COUNT: usize = 8;
/// Collection bound before sorting; keeps pathological trees in check.
const COLLECT_LIMIT: usize = 1000;

pub struct GrepTool;

#[derive(Debug, Deserialize)]
struct GrepInput {
    pattern: String,
    /// Root of the search (defaults to the working directory)
    #[serde(default)]
    path: Option<String>,
    /// Only scan files matching this glob (e.g. "*.rs")
    #[serde(default)]
    include: Option<String>,
    /// Skip files matching this glob
    #[serde(default)]
    exclude: Option<String>,
    #[serde(default)]
    max_results: Option<usize>,
    /// Lines of context shown around each match
    #[serde(default)]
    context_lines: Option<usize>,
}

struct GrepMatch {
    path: PathBuf,
    mtime: SystemTime,
    line_number: usize,
    context: String,
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search file contents recursively with a regular expression. Supports include/\
         exclude globs and context lines; VCS and build directories are skipped. Results \
         are capped and ordered by file modification time."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search (defaults to the working directory)"
                },
                "include": {
                    "type": "string",
                    "description": "Glob of files to include, e.g. \"*.rs\""
                },
                "exclude": {
                    "type": "string",
                    "description": "Glob of files to skip"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of matches to return (default 10)",
                    "minimum": 1
                },
                "context_lines": {
                    "type": "integer",
                    "description": "Lines of context around each match",
                    "minimum": 0
                }
            },
            "required": ["pattern"]
        })
    }

    fn concurrency_safe(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, context: &ToolExecutionContext) -> Result<ToolResult> {
        let input: GrepInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        let regex = match Regex::new(&input.pattern) {
            Ok(regex) => Arc::new(regex),
            Err(e) => return Ok(ToolResult::failure(format!("invalid regex: {e}"))),
        };
        let include = match input.include.as_deref().map(glob::Pattern::new).transpose() {
            Ok(include) => include,
            Err(e) => return Ok(ToolResult::failure(format!("invalid include glob: {e}"))),
        };
        let exclude = match input.exclude.as_deref().map(glob::Pattern::new).transpose() {
            Ok(exclude) => exclude,
            Err(e) => return Ok(ToolResult::failure(format!("invalid exclude glob: {e}"))),
        };

        let root = match &input.path {
            Some(path) => context.resolve(path),
            None => context.working_dir.clone(),
        };
        let max_results = input.max_results.unwrap_or(DEFAULT_MAX_RESULTS).max(1);
        let context_lines = input.context_lines.unwrap_or(0);

        // Breadth-first candidate collection.
        let files = collect_files(&root, include.as_ref(), exclude.as_ref());

        // Worker pool over a shared queue.
        let queue = Arc::new(Mutex::new(VecDeque::from(files)));
        let matches: Arc<Mutex<Vec<GrepMatch>>> = Arc::new(Mutex::new(Vec::new()));
        let mut workers = Vec::new();
        for _ in 0..WORKER_COUNT {
            let queue = Arc::clone(&queue);
            let matches = Arc::clone(&matches);
            let regex = Arc::clone(&regex);
            let cancel = context.cancel.clone();
            workers.push(tokio::task::spawn_blocking(move || {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if matches.lock().unwrap().len() >= COLLECT_LIMIT {
                        break;
                    }
                    let Some(path) = queue.lock().unwrap().pop_front() else {
                        break;
                    };
                    scan_file(&path, &regex, context_lines, &matches);
                }
            }));
        }
        for worker in workers {
            let _ = worker.await;
        }

        let mut matches = Arc::try_unwrap(matches)
            .map(|m| m.into_inner().unwrap())
            .unwrap_or_default();

        matches.sort_by(|a, b| {
            (Reverse(a.mtime), &a.path, a.line_number)
                .cmp(&(Reverse(b.mtime), &b.path, b.line_number))
        });
        let total = matches.len();
        matches.truncate(max_results);

        if matches.is_empty() {
            return Ok(ToolResult::success("no matches found".to_string()));
        }

        let mut output = String::new();
        for m in &matches {
            output.push_str(&m.context);
            if context_lines > 0 {
                output.push_str("--\n");
            }
        }
        if total > max_results {
            output.push_str(&format!("... {} more matches not shown\n", total - max_results));
        }
        Ok(ToolResult::success(output))
    }
}

/// BFS over the tree rooted at `root`, honoring the default ignored dirs
/// and the include/exclude globs.
fn collect_files(
    root: &std::path::Path,
    include: Option<&glob::Pattern>,
    exclude: Option<&glob::Pattern>,
) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut dirs = VecDeque::from([root.to_path_buf()]);

    while let Some(dir) = dirs.pop_front() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if !DEFAULT_IGNORED_DIRS.contains(&name) {
                    dirs.push_back(path);
                }
                continue;
            }
            if !file_type.is_file() {
                continue;
            }
            if let Some(include) = include
                && !include.matches(name)
            {
                continue;
            }
            if let Some(exclude) = exclude
                && exclude.matches(name)
            {
                continue;
            }
            files.push(path);
        }
    }
    files
}

/// Scan one file for matches; silently skips unreadable or binary files.
fn scan_file(
    path: &std::path::Path,
    regex: &Regex,
    context_lines: usize,
    matches: &Arc<Mutex<Vec<GrepMatch>>>,
) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let mtime = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let lines: Vec<&str> = content.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if !regex.is_match(line) {
            continue;
        }

        let start = i.saturating_sub(context_lines);
        let end = (i + context_lines + 1).min(lines.len());
        let mut context = String::new();
        for (j, context_line) in lines.iter().enumerate().take(end).skip(start) {
            let sep = if j == i { ':' } else { '-' };
            context.push_str(&format!("{}{sep}{}{sep}{}\n", path.display(), j + 1, context_line));
        }

        let mut guard = matches.lock().unwrap();
        if guard.len() >= COLLECT_LIMIT {
            return;
        }
        guard.push(GrepMatch {
            path: path.to_path_buf(),
            mtime,
            line_number: i + 1,
            context,
        });
    }
}
