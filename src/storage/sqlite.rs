//! Relational session store.
//!
//! A single SQLite table keyed by session id, with `messages` and
//! `metadata` serialized as JSON columns. Connections come from a
//! deadpool pool; schema is managed with versioned migrations.

use super::{Result, SessionStorage, StorageError};
use crate::message::{Message, SessionContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_sqlite::{Config as PoolConfig, Pool, Runtime};
use rusqlite_migration::{M, Migrations};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

pub struct SqliteSessionStorage {
    pool: Pool,
}

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "CREATE TABLE sessions (
                id TEXT PRIMARY KEY,
                messages TEXT NOT NULL,
                compressed_history TEXT NOT NULL DEFAULT '',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                last_activity TEXT NOT NULL,
                total_tokens INTEGER NOT NULL DEFAULT 0
            );",
        ),
        M::up(
            "CREATE TABLE blobs (
                name TEXT PRIMARY KEY,
                content TEXT NOT NULL
            );",
        ),
    ])
}

fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}

/// Row shape as stored; converted to/from `SessionContext` at the edges.
struct SessionRow {
    id: String,
    messages: String,
    compressed_history: String,
    metadata: String,
    created_at: String,
    last_activity: String,
    total_tokens: i64,
}

impl SessionRow {
    fn from_session(session: &SessionContext) -> Result<Self> {
        Ok(Self {
            id: session.id.to_string(),
            messages: serde_json::to_string(&session.messages)?,
            compressed_history: session.compressed_history.clone(),
            metadata: serde_json::to_string(&session.metadata)?,
            created_at: session.created_at.to_rfc3339(),
            last_activity: session.last_activity.to_rfc3339(),
            total_tokens: session.total_tokens as i64,
        })
    }

    fn into_session(self) -> Result<SessionContext> {
        let id = Uuid::parse_str(&self.id).map_err(db_err)?;
        let messages: Vec<Message> = serde_json::from_str(&self.messages)?;
        let metadata: BTreeMap<String, String> = serde_json::from_str(&self.metadata)?;
        let created_at = parse_timestamp(&self.created_at)?;
        let last_activity = parse_timestamp(&self.last_activity)?;
        Ok(SessionContext {
            id,
            messages,
            compressed_history: self.compressed_history,
            metadata,
            created_at,
            last_activity,
            total_tokens: self.total_tokens.max(0) as usize,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(db_err)
}

impl SqliteSessionStorage {
    /// Open (or create) the database file and bring the schema up to date.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let pool = PoolConfig::new(path)
            .create_pool(Runtime::Tokio1)
            .map_err(db_err)?;

        let conn = pool.get().await.map_err(db_err)?;
        conn.interact(|conn| migrations().to_latest(conn))
            .await
            .map_err(db_err)?
            .map_err(db_err)?;

        tracing::debug!("sqlite session store ready at {}", path.display());
        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStorage for SqliteSessionStorage {
    async fn save_session(&self, session: &SessionContext) -> Result<()> {
        let row = SessionRow::from_session(session)?;
        let conn = self.pool.get().await.map_err(db_err)?;
        conn.interact(move |conn| {
            conn.execute(
                "INSERT INTO sessions
                     (id, messages, compressed_history, metadata, created_at, last_activity, total_tokens)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                     messages = excluded.messages,
                     compressed_history = excluded.compressed_history,
                     metadata = excluded.metadata,
                     last_activity = excluded.last_activity,
                     total_tokens = excluded.total_tokens",
                rusqlite::params![
                    row.id,
                    row.messages,
                    row.compressed_history,
                    row.metadata,
                    row.created_at,
                    row.last_activity,
                    row.total_tokens,
                ],
            )
        })
        .await
        .map_err(db_err)?
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_session(&self, id: Uuid) -> Result<Option<SessionContext>> {
        let id_str = id.to_string();
        let conn = self.pool.get().await.map_err(db_err)?;
        let row = conn
            .interact(move |conn| -> rusqlite::Result<Option<SessionRow>> {
                let mut stmt = conn.prepare(
                    "SELECT id, messages, compressed_history, metadata,
                            created_at, last_activity, total_tokens
                     FROM sessions WHERE id = ?1",
                )?;
                let mut rows = stmt.query_map([id_str], row_to_session_row)?;
                rows.next().transpose()
            })
            .await
            .map_err(db_err)?
            .map_err(db_err)?;

        row.map(SessionRow::into_session).transpose()
    }

    async fn load_all_sessions(&self) -> Result<Vec<SessionContext>> {
        let conn = self.pool.get().await.map_err(db_err)?;
        let rows = conn
            .interact(|conn| -> rusqlite::Result<Vec<SessionRow>> {
                let mut stmt = conn.prepare(
                    "SELECT id, messages, compressed_history, metadata,
                            created_at, last_activity, total_tokens
                     FROM sessions ORDER BY created_at",
                )?;
                let rows = stmt.query_map([], row_to_session_row)?;
                rows.collect()
            })
            .await
            .map_err(db_err)?
            .map_err(db_err)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            match row.into_session() {
                Ok(session) => sessions.push(session),
                Err(e) => tracing::warn!("skipping corrupt session row: {}", e),
            }
        }
        Ok(sessions)
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        let id_str = id.to_string();
        let conn = self.pool.get().await.map_err(db_err)?;
        conn.interact(move |conn| conn.execute("DELETE FROM sessions WHERE id = ?1", [id_str]))
            .await
            .map_err(db_err)?
            .map_err(db_err)?;
        Ok(())
    }

    async fn save_blob(&self, name: &str, content: &str) -> Result<()> {
        let name = name.to_string();
        let content = content.to_string();
        let conn = self.pool.get().await.map_err(db_err)?;
        conn.interact(move |conn| {
            conn.execute(
                "INSERT INTO blobs (name, content) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET content = excluded.content",
                rusqlite::params![name, content],
            )
        })
        .await
        .map_err(db_err)?
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_blob(&self, name: &str) -> Result<String> {
        let name = name.to_string();
        let conn = self.pool.get().await.map_err(db_err)?;
        let content = conn
            .interact(move |conn| -> rusqlite::Result<Option<String>> {
                let mut stmt = conn.prepare("SELECT content FROM blobs WHERE name = ?1")?;
                let mut rows = stmt.query_map([name], |row| row.get::<_, String>(0))?;
                rows.next().transpose()
            })
            .await
            .map_err(db_err)?
            .map_err(db_err)?;
        Ok(content.unwrap_or_default())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close();
        Ok(())
    }
}

fn row_to_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        messages: row.get(1)?,
        compressed_history: row.get(2)?,
        metadata: row.get(3)?,
        created_at: row.get(4)?,
        last_activity: row.get(5)?,
        total_tokens: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, ToolCall};

    async fn temp_storage() -> (tempfile::TempDir, SqliteSessionStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteSessionStorage::connect(&dir.path().join("sessions.db"))
            .await
            .unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let (_dir, storage) = temp_storage().await;

        let mut session = SessionContext::new(Uuid::new_v4());
        session.messages.push(Message::user("hello"));
        session.messages.push(Message::assistant_with_tool_calls(
            "on it",
            vec![ToolCall::new("t1", "bash", "{\"command\":\"ls\"}")],
        ));
        session.messages.push(Message::tool("file listing", "t1", "bash", true));
        session.compressed_history = "summary so far".to_string();
        session.metadata.insert("title".to_string(), "hello".to_string());
        session.total_tokens = 99;

        storage.save_session(&session).await.unwrap();
        let loaded = storage.load_session(session.id).await.unwrap().unwrap();

        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.messages.len(), 3);
        assert_eq!(loaded.messages[1].tool_calls, session.messages[1].tool_calls);
        assert_eq!(
            loaded.messages[2].metadata.get("tool_call_id").map(String::as_str),
            Some("t1")
        );
        assert_eq!(loaded.compressed_history, "summary so far");
        assert_eq!(loaded.total_tokens, 99);
        assert_eq!(
            loaded.last_activity.timestamp(),
            session.last_activity.timestamp()
        );
    }

    #[tokio::test]
    async fn test_overwrite_updates_row() {
        let (_dir, storage) = temp_storage().await;
        let mut session = SessionContext::new(Uuid::new_v4());
        storage.save_session(&session).await.unwrap();

        session.messages.push(Message::user("second write"));
        session.total_tokens = 7;
        storage.save_session(&session).await.unwrap();

        let loaded = storage.load_session(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.total_tokens, 7);
        assert_eq!(storage.load_all_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_blob() {
        let (_dir, storage) = temp_storage().await;
        let session = SessionContext::new(Uuid::new_v4());
        storage.save_session(&session).await.unwrap();
        storage.delete_session(session.id).await.unwrap();
        assert!(storage.load_session(session.id).await.unwrap().is_none());

        assert_eq!(storage.load_blob("notes.md").await.unwrap(), "");
        storage.save_blob("notes.md", "v1").await.unwrap();
        storage.save_blob("notes.md", "v2").await.unwrap();
        assert_eq!(storage.load_blob("notes.md").await.unwrap(), "v2");
    }
}
