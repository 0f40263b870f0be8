//! OpenCoder - Core Agent Runtime
//!
//! The engine of a conversational coding assistant: an LLM-driven
//! reason-act loop, a concurrent tool executor, persistent session memory
//! with LLM-assisted compaction, and hot-reloadable prompt templates.
//!
//! ## Architecture
//!
//! - **Agent Loop:** alternates LLM calls and tool execution for a turn
//! - **Tool Engine:** runs batches of tool calls with per-tool safety
//!   rules, a global concurrency limit and per-call timeouts
//! - **Context Manager:** ordered per-session message log with token
//!   accounting and compaction against a context-window budget
//! - **Prompt Manager:** named templates from a directory, hot-reloaded
//! - **Providers:** OpenAI-compatible and Anthropic dialects behind one
//!   trait, including streaming tool-call reassembly
//! - **Storage:** JSON-document and SQLite session stores behind one trait
//!
//! The HTTP/CLI surface, provider credentials UI and any rendering layer
//! live outside this crate; they talk to [`agent::Agent`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use opencoder::agent::{Agent, ChatRequest};
//! use opencoder::config::Config;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let agent = Agent::from_config(&config).await?;
//! let response = agent.chat(ChatRequest::new("list the rust files here")).await?;
//! println!("{}", response.response);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod message;
pub mod prompts;
pub mod provider;
pub mod storage;
pub mod tools;

// Re-export commonly used types
pub use agent::{Agent, AgentState, AgentStatus, ChatRequest, ChatResponse};
pub use config::Config;
pub use error::OpenCoderError;
pub use message::{Message, Role, SessionContext, ToolCall, ToolResult};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
