//! Document-per-session file store.
//!
//! One pretty-printed JSON file per session, filename encodes the id.

use super::{Result, SessionStorage, StorageError};
use crate::message::SessionContext;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct FileSessionStorage {
    root: PathBuf,
}

impl FileSessionStorage {
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn session_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("session_{id}.json"))
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        // Blob names come from configuration, not from the model; strip
        // path separators anyway so a bad value cannot escape the root.
        let safe: String = name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.root.join(safe)
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn save_session(&self, session: &SessionContext) -> Result<()> {
        let path = self.session_path(session.id);
        let json = serde_json::to_string_pretty(session)?;
        // Write to a temp file then rename so a crash mid-write never
        // leaves a truncated session document.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load_session(&self, id: Uuid) -> Result<Option<SessionContext>> {
        let path = self.session_path(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn load_all_sessions(&self) -> Result<Vec<SessionContext>> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with("session_") || !name.ends_with(".json") {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(raw) => match serde_json::from_str::<SessionContext>(&raw) {
                    Ok(session) => sessions.push(session),
                    Err(e) => {
                        tracing::warn!("skipping corrupt session file {}: {}", path.display(), e)
                    }
                },
                Err(e) => tracing::warn!("cannot read session file {}: {}", path.display(), e),
            }
        }
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn delete_session(&self, id: Uuid) -> Result<()> {
        let path = self.session_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn save_blob(&self, name: &str, content: &str) -> Result<()> {
        tokio::fs::write(self.blob_path(name), content).await?;
        Ok(())
    }

    async fn load_blob(&self, name: &str) -> Result<String> {
        match tokio::fs::read_to_string(self.blob_path(name)).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, ToolCall};

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path()).unwrap();

        let mut session = SessionContext::new(Uuid::new_v4());
        session.messages.push(Message::user("hello"));
        session.messages.push(Message::assistant_with_tool_calls(
            "reading",
            vec![ToolCall::new("t1", "read", "{\"file_path\":\"/a\"}")],
        ));
        session.compressed_history = "earlier summary".to_string();
        session.metadata.insert("title".to_string(), "hello".to_string());
        session.total_tokens = 42;

        storage.save_session(&session).await.unwrap();
        let loaded = storage.load_session(session.id).await.unwrap().unwrap();

        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].content, "hello");
        assert_eq!(loaded.messages[1].tool_calls, session.messages[1].tool_calls);
        assert_eq!(loaded.compressed_history, "earlier summary");
        assert_eq!(loaded.metadata, session.metadata);
        assert_eq!(loaded.total_tokens, 42);
        assert_eq!(
            loaded.created_at.timestamp(),
            session.created_at.timestamp()
        );
    }

    #[tokio::test]
    async fn test_load_missing_session_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path()).unwrap();
        assert!(storage.load_session(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_all_preserves_order_and_skips_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path()).unwrap();

        let first = SessionContext::new(Uuid::new_v4());
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = SessionContext::new(Uuid::new_v4());
        storage.save_session(&second).await.unwrap();
        storage.save_session(&first).await.unwrap();
        std::fs::write(dir.path().join("session_bogus.json"), "{not json").unwrap();

        let all = storage.load_all_sessions().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[1].id, second.id);
    }

    #[tokio::test]
    async fn test_delete_session() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path()).unwrap();
        let session = SessionContext::new(Uuid::new_v4());
        storage.save_session(&session).await.unwrap();
        storage.delete_session(session.id).await.unwrap();
        assert!(storage.load_session(session.id).await.unwrap().is_none());
        // Deleting twice is fine
        storage.delete_session(session.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_blob_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileSessionStorage::new(dir.path()).unwrap();
        assert_eq!(storage.load_blob("agent-notes.md").await.unwrap(), "");
        storage.save_blob("agent-notes.md", "remember the tests").await.unwrap();
        assert_eq!(
            storage.load_blob("agent-notes.md").await.unwrap(),
            "remember the tests"
        );
    }
}
