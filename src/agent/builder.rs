//! Agent construction and per-session status tracking.

use super::types::{AgentState, AgentStatus, Result};
use crate::config::Config;
use crate::context::ContextManager;
use crate::prompts::PromptManager;
use crate::provider::Provider;
use crate::tools::{ToolEngine, ToolRegistry};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

pub(super) struct SessionState {
    pub status: AgentStatus,
    pub active_tools: Vec<String>,
}

/// The core agent: orchestrates provider, tool engine, context manager
/// and prompt manager for chat turns.
pub struct Agent {
    pub(super) provider: Arc<dyn Provider>,
    pub(super) context: Arc<ContextManager>,
    pub(super) engine: Arc<ToolEngine>,
    pub(super) prompts: Arc<PromptManager>,
    pub(super) max_loops: usize,
    pub(super) working_dir: PathBuf,
    pub(super) states: RwLock<HashMap<Uuid, SessionState>>,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        context: Arc<ContextManager>,
        engine: Arc<ToolEngine>,
        prompts: Arc<PromptManager>,
    ) -> Self {
        Self {
            provider,
            context,
            engine,
            prompts,
            max_loops: 50,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Wire the whole runtime from configuration: providers from the
    /// factory, storage per `context.storage_type`, prompts with optional
    /// hot reload, tool registry from `tools.enabled_tools`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;

        let provider = crate::provider::create_provider(config)?;
        let compression = crate::provider::create_compression_provider(config)?;
        let prompts = Arc::new(PromptManager::new(&config.prompts)?);
        let storage = crate::storage::open_storage(&config.context).await?;
        let context = Arc::new(
            ContextManager::new(
                storage,
                compression,
                prompts.clone(),
                config.context.history_limit,
                config.agent.compression_threshold,
                config.agent.context_window,
                config.context.persistence_file.clone(),
            )
            .await?,
        );

        let registry = Arc::new(ToolRegistry::from_enabled(&config.tools.enabled_tools));
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let engine = Arc::new(ToolEngine::new(registry, &config.tools, working_dir.clone()));

        Ok(Self {
            provider,
            context,
            engine,
            prompts,
            max_loops: config.agent.max_loops,
            working_dir,
            states: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_max_loops(mut self, max_loops: usize) -> Self {
        self.max_loops = max_loops;
        self
    }

    pub fn with_working_directory(mut self, working_dir: PathBuf) -> Self {
        self.working_dir = working_dir;
        self
    }

    pub fn context(&self) -> &Arc<ContextManager> {
        &self.context
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider()
    }

    pub(super) fn set_status(&self, session_id: Uuid, status: AgentStatus) {
        let mut states = self.states.write().expect("agent state lock poisoned");
        let state = states.entry(session_id).or_insert(SessionState {
            status: AgentStatus::Idle,
            active_tools: Vec::new(),
        });
        state.status = status;
        if status != AgentStatus::ExecutingTools {
            state.active_tools.clear();
        }
    }

    pub(super) fn set_active_tools(&self, session_id: Uuid, tools: Vec<String>) {
        let mut states = self.states.write().expect("agent state lock poisoned");
        if let Some(state) = states.get_mut(&session_id) {
            state.active_tools = tools;
        }
    }

    /// Current loop state plus a session snapshot.
    pub async fn get_state(&self, session_id: &str) -> Result<AgentState> {
        let id = Uuid::parse_str(session_id)
            .map_err(|_| super::types::AgentError::InvalidSessionId(session_id.to_string()))?;
        let session = self
            .context
            .get_session_context(id)
            .await
            .ok_or_else(|| super::types::AgentError::NotFound(session_id.to_string()))?;

        let (status, active_tools) = {
            let states = self.states.read().expect("agent state lock poisoned");
            match states.get(&id) {
                Some(state) => (state.status, state.active_tools.clone()),
                None => (AgentStatus::Idle, Vec::new()),
            }
        };

        Ok(AgentState {
            session_id: session.id.to_string(),
            status,
            messages: session.messages,
            compressed_history: session.compressed_history,
            active_tools,
            last_activity: session.last_activity,
        })
    }
}
