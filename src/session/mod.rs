//! Session module - Conversation state and its persistence boundary
//!
//! The agent loop mutates a [`Session`] in place while a turn runs. Loading
//! and saving sessions is delegated to an injected [`SessionStore`];
//! [`SessionManager`] is the bundled implementation (in-memory cache with
//! optional JSON files).
//!
//! # Example
//!
//! ```
//! use steward::session::{Message, SessionManager, SessionStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SessionManager::new_memory();
//!     let mut session = manager.get_or_create("chat-1", "model").await.unwrap();
//!     session.add_message(Message::user("Hello!"));
//!     manager.save(&session).await.unwrap();
//!     assert_eq!(manager.list().await.unwrap(), vec!["chat-1".to_string()]);
//! }
//! ```

pub mod types;

pub use types::{
    ContentPart, Message, Role, Session, ToolCall, ToolCallStatus, ToolResult, TurnStatus,
    UsageCounters,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::Result;

/// Persistence collaborator for sessions.
///
/// The core never deletes sessions on its own; `delete` exists for callers.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session by id.
    async fn load(&self, id: &str) -> Result<Option<Session>>;
    /// Insert or replace a session.
    async fn save(&self, session: &Session) -> Result<()>;
    /// Remove a session.
    async fn delete(&self, id: &str) -> Result<()>;
    /// List stored session ids, sorted.
    async fn list(&self) -> Result<Vec<String>>;
}

/// Session manager for storing and retrieving conversation sessions.
///
/// Uses `Arc<RwLock>` internally, making it safe to clone and share across
/// async tasks. When created with [`SessionManager::new`] or
/// [`SessionManager::with_path`], sessions are also written to disk as JSON.
#[derive(Clone)]
pub struct SessionManager {
    /// In-memory cache of sessions
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    /// Optional path for file-based persistence
    storage_path: Option<PathBuf>,
}

impl SessionManager {
    /// Create a session manager persisting to `~/.steward/sessions/`.
    pub fn new() -> Result<Self> {
        Self::with_path(Config::dir().join("sessions"))
    }

    /// Create an in-memory session manager without persistence.
    pub fn new_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
        }
    }

    /// Create a session manager with a custom storage directory.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(path),
        })
    }

    /// Get an existing session or create a new, unsaved one.
    pub async fn get_or_create(&self, id: &str, model: &str) -> Result<Session> {
        match self.load(id).await? {
            Some(session) => Ok(session),
            None => Ok(Session::new(id, model)),
        }
    }

    /// Number of sessions in the memory cache.
    pub async fn cache_size(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn file_path(&self, id: &str) -> Option<PathBuf> {
        self.storage_path
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", sanitize_id(id))))
    }
}

#[async_trait]
impl SessionStore for SessionManager {
    async fn load(&self, id: &str) -> Result<Option<Session>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(id) {
                return Ok(Some(session.clone()));
            }
        }

        if let Some(file_path) = self.file_path(id) {
            if file_path.exists() {
                let content = tokio::fs::read_to_string(&file_path).await?;
                let session: Session = serde_json::from_str(&content)?;
                let mut sessions = self.sessions.write().await;
                sessions.insert(id.to_string(), session.clone());
                return Ok(Some(session));
            }
        }

        Ok(None)
    }

    async fn save(&self, session: &Session) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.id.clone(), session.clone());
        }

        if let Some(file_path) = self.file_path(&session.id) {
            let content = serde_json::to_string_pretty(session)?;
            tokio::fs::write(&file_path, content).await?;
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(id);
        }

        if let Some(file_path) = self.file_path(id) {
            if file_path.exists() {
                tokio::fs::remove_file(&file_path).await?;
            }
        }

        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions.keys().cloned().collect()
        };

        // Read each file for the real id; filenames are sanitized.
        if let Some(ref storage_path) = self.storage_path {
            let mut entries = tokio::fs::read_dir(storage_path).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    if let Ok(content) = tokio::fs::read_to_string(&path).await {
                        if let Ok(session) = serde_json::from_str::<Session>(&content) {
                            if !ids.contains(&session.id) {
                                ids.push(session.id);
                            }
                        }
                    }
                }
            }
        }

        ids.sort();
        Ok(ids)
    }
}

/// Percent-encode characters that are unsafe in filenames. Reversible, so two
/// ids never share a file.
fn sanitize_id(id: &str) -> String {
    let mut result = String::with_capacity(id.len() * 3);
    for c in id.chars() {
        match c {
            '/' => result.push_str("%2F"),
            '\\' => result.push_str("%5C"),
            ':' => result.push_str("%3A"),
            '*' => result.push_str("%2A"),
            '?' => result.push_str("%3F"),
            '"' => result.push_str("%22"),
            '<' => result.push_str("%3C"),
            '>' => result.push_str("%3E"),
            '|' => result.push_str("%7C"),
            '%' => result.push_str("%25"),
            c => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_does_not_persist() {
        let manager = SessionManager::new_memory();
        let session = manager.get_or_create("s1", "m").await.unwrap();
        assert_eq!(session.id, "s1");
        assert_eq!(manager.cache_size().await, 0);
    }

    #[tokio::test]
    async fn test_save_and_load_memory() {
        let manager = SessionManager::new_memory();
        let mut session = Session::new("s1", "m");
        session.add_message(Message::user("hello"));
        manager.save(&session).await.unwrap();

        let loaded = manager.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.messages().len(), 1);
        assert_eq!(loaded.messages()[0].text(), "hello");
    }

    #[tokio::test]
    async fn test_persistence_across_managers() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new("telegram:chat/1", "m");
        session.add_message(Message::user("persist me"));
        session.record_usage(10, 3, 0.5);

        let first = SessionManager::with_path(dir.path().to_path_buf()).unwrap();
        first.save(&session).await.unwrap();

        let second = SessionManager::with_path(dir.path().to_path_buf()).unwrap();
        let loaded = second.load("telegram:chat/1").await.unwrap().unwrap();
        assert_eq!(loaded.messages()[0].text(), "persist me");
        assert_eq!(loaded.usage().input_tokens, 10);
        assert_eq!(
            second.list().await.unwrap(),
            vec!["telegram:chat/1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::with_path(dir.path().to_path_buf()).unwrap();
        manager.save(&Session::new("gone", "m")).await.unwrap();
        manager.delete("gone").await.unwrap();
        assert!(manager.load("gone").await.unwrap().is_none());
        assert!(manager.list().await.unwrap().is_empty());
    }

    #[test]
    fn test_sanitize_id_is_injective() {
        assert_eq!(sanitize_id("a:b"), "a%3Ab");
        assert_eq!(sanitize_id("a%3Ab"), "a%253Ab");
        assert_ne!(sanitize_id("a/b"), sanitize_id("a%2Fb"));
    }
}
