//! Per-session message log with token-budget enforcement.

use super::tokens;
use super::{ContextError, Result};
use crate::message::{Message, Role, SessionContext};
use crate::prompts::PromptManager;
use crate::provider::{LLMRequest, Provider};
use crate::storage::SessionStorage;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Maximum length of the auto-derived session title.
const TITLE_MAX_CHARS: usize = 64;

/// Owns every session's message log. Appends, reads and compactions are
/// serialized per session through a per-session async mutex; reads hand
/// out deep copies so later appends never mutate data already returned.
pub struct ContextManager {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionContext>>>>,
    storage: Arc<dyn SessionStorage>,
    compression: Arc<dyn Provider>,
    prompts: Arc<PromptManager>,
    history_limit: usize,
    compression_threshold: f64,
    context_window: u32,
    persistence_file: String,
}

impl ContextManager {
    /// Build the manager and warm the in-memory table from storage.
    ///
    /// `context_window` falls back to the compression provider's configured
    /// window when no override is set.
    pub async fn new(
        storage: Arc<dyn SessionStorage>,
        compression: Arc<dyn Provider>,
        prompts: Arc<PromptManager>,
        history_limit: usize,
        compression_threshold: f64,
        context_window_override: Option<u32>,
        persistence_file: String,
    ) -> Result<Self> {
        let context_window =
            context_window_override.unwrap_or_else(|| compression.config().context_window);

        let mut sessions = HashMap::new();
        for session in storage.load_all_sessions().await? {
            sessions.insert(session.id, Arc::new(Mutex::new(session)));
        }
        tracing::info!(
            "context manager ready: {} stored sessions, window {} tokens, threshold {:.0}%",
            sessions.len(),
            context_window,
            compression_threshold * 100.0
        );

        Ok(Self {
            sessions: RwLock::new(sessions),
            storage,
            compression,
            prompts,
            history_limit,
            compression_threshold,
            context_window,
            persistence_file,
        })
    }

    /// Resolve an existing session or register a new one. New sessions get
    /// a server-assigned id when the caller passes `None`; they are first
    /// persisted by the append that follows.
    pub async fn ensure_session(&self, id: Option<Uuid>) -> Uuid {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(SessionContext::new(id))));
        id
    }

    async fn session_handle(&self, id: Uuid) -> Option<Arc<Mutex<SessionContext>>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Append a message: recompute the token estimate, compact when the
    /// budget is exceeded, and persist. Storage failure aborts the append.
    pub async fn add_message(&self, session_id: Uuid, message: Message) -> Result<()> {
        let handle = match self.session_handle(session_id).await {
            Some(handle) => handle,
            None => {
                self.ensure_session(Some(session_id)).await;
                self.session_handle(session_id)
                    .await
                    .ok_or(ContextError::NotFound(session_id))?
            }
        };

        let mut ctx = handle.lock().await;

        if message.role == Role::User && !ctx.metadata.contains_key("title") {
            let title: String = message.content.chars().take(TITLE_MAX_CHARS).collect();
            ctx.metadata.insert("title".to_string(), title);
        }

        ctx.messages.push(message);
        ctx.last_activity = Utc::now();
        Self::recompute_tokens(&mut ctx);

        let threshold =
            (self.context_window as f64 * self.compression_threshold).round() as usize;
        if ctx.total_tokens > threshold || ctx.messages.len() > 2 * self.history_limit {
            if let Err(e) = self.compact_locked(&mut ctx).await {
                tracing::warn!("compaction failed for session {}: {}", session_id, e);
            }
            // The hard cap holds even when the compression LLM is down.
            if ctx.messages.len() > 2 * self.history_limit {
                let drop = ctx.messages.len() - 2 * self.history_limit;
                tracing::warn!(
                    "session {} over hard cap, dropping {} oldest messages",
                    session_id,
                    drop
                );
                ctx.messages.drain(..drop);
                Self::recompute_tokens(&mut ctx);
            }
        }

        self.storage.save_session(&ctx).await?;
        Ok(())
    }

    /// Snapshot of the current log. Unknown session yields an empty list.
    pub async fn get_messages(&self, session_id: Uuid) -> Vec<Message> {
        match self.session_handle(session_id).await {
            Some(handle) => handle.lock().await.messages.clone(),
            None => Vec::new(),
        }
    }

    /// Deep-copy snapshot of the whole session.
    pub async fn get_session_context(&self, session_id: Uuid) -> Option<SessionContext> {
        match self.session_handle(session_id).await {
            Some(handle) => Some(handle.lock().await.clone()),
            None => None,
        }
    }

    /// Force compaction regardless of the token gate.
    pub async fn compress_history(&self, session_id: Uuid) -> Result<()> {
        let handle = self
            .session_handle(session_id)
            .await
            .ok_or(ContextError::NotFound(session_id))?;
        let mut ctx = handle.lock().await;
        self.compact_locked(&mut ctx).await?;
        self.storage.save_session(&ctx).await?;
        Ok(())
    }

    /// Remove a session from memory and storage.
    pub async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        self.sessions.write().await.remove(&session_id);
        self.storage.delete_session(session_id).await?;
        Ok(())
    }

    /// Read the store-wide persistent notes blob.
    pub async fn load_persistent_context(&self) -> Result<String> {
        Ok(self.storage.load_blob(&self.persistence_file).await?)
    }

    /// Write the store-wide persistent notes blob.
    pub async fn save_persistent_context(&self, content: &str) -> Result<()> {
        self.storage.save_blob(&self.persistence_file, content).await?;
        Ok(())
    }

    pub fn context_window(&self) -> u32 {
        self.context_window
    }

    fn recompute_tokens(ctx: &mut SessionContext) {
        ctx.total_tokens = tokens::estimate_text(&ctx.compressed_history)
            + ctx.messages.iter().map(tokens::estimate_message).sum::<usize>();
    }

    /// Summarize everything but the most recent message through the
    /// compression LLM, fold the summary into `compressed_history`, and
    /// truncate the log to the retained window. No-op for tiny logs.
    async fn compact_locked(&self, ctx: &mut SessionContext) -> Result<()> {
        if ctx.messages.len() <= 2 {
            return Ok(());
        }

        let split = ctx.messages.len() - 1;
        let history: String = ctx.messages[..split]
            .iter()
            .map(|m| format!("{}: {}\n", m.role, m.content))
            .collect();

        let prompt = self.prompts.get_with_data(
            "compression",
            json!({
                "conversation_history": history,
                "token_limit": self.context_window / 4,
            }),
        )?;

        let request = LLMRequest::new(vec![Message::user(prompt)])
            .with_max_tokens(self.compression.config().max_tokens);
        let response = self.compression.chat(request).await?;
        let summary = response.content.trim().to_string();
        if summary.is_empty() {
            tracing::warn!("compression LLM returned an empty summary, keeping log as-is");
            return Ok(());
        }

        if !ctx.compressed_history.is_empty() {
            ctx.compressed_history.push_str("\n\n");
        }
        ctx.compressed_history.push_str(&summary);

        let keep = self.history_limit.min(ctx.messages.len());
        let drop = ctx.messages.len() - keep;
        ctx.messages.drain(..drop);
        Self::recompute_tokens(ctx);

        tracing::info!(
            "compacted session {}: dropped {} messages, {} tokens now",
            ctx.id,
            drop,
            ctx.total_tokens
        );
        Ok(())
    }
}
