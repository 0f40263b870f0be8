//! Session Storage Layer
//!
//! Opaque persistence behind a small async trait. Two backends: a
//! document-per-session JSON file store and a SQLite table. The context
//! manager depends only on the trait.

mod file;
mod sqlite;

pub use file::FileSessionStorage;
pub use sqlite::SqliteSessionStorage;

use crate::config::ContextConfig;
use crate::message::SessionContext;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Persistence contract consumed by the context manager. Session ids are
/// hyphenated lowercase UUIDs; timestamps are RFC-3339 UTC.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save_session(&self, session: &SessionContext) -> Result<()>;

    async fn load_session(&self, id: Uuid) -> Result<Option<SessionContext>>;

    async fn load_all_sessions(&self) -> Result<Vec<SessionContext>>;

    async fn delete_session(&self, id: Uuid) -> Result<()>;

    /// Store-wide free-form text blob (the agent's persistent notes).
    async fn save_blob(&self, name: &str, content: &str) -> Result<()>;

    /// Returns an empty string when the blob does not exist yet.
    async fn load_blob(&self, name: &str) -> Result<String>;

    async fn close(&self) -> Result<()>;
}

/// Open the backend selected by `context.storage_type`.
pub async fn open_storage(config: &ContextConfig) -> Result<Arc<dyn SessionStorage>> {
    match config.storage_type.as_str() {
        "relational-store" => {
            let db_path = config.storage_path.join("sessions.db");
            let storage = SqliteSessionStorage::connect(&db_path).await?;
            Ok(Arc::new(storage))
        }
        // validated at config load; anything else means the caller skipped
        // validation, so default to the document store
        _ => {
            let storage = FileSessionStorage::new(&config.storage_path)?;
            Ok(Arc::new(storage))
        }
    }
}
