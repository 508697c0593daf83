use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ContextError;
use crate::types::Message;

/// Owns message persistence. This crate only computes the next version of a
/// history; every read and write goes through here.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Full ordered history for a session. Unknown sessions are empty.
    async fn read_all(&self, session_id: &str) -> Result<Vec<Message>, ContextError>;

    /// Append messages at the end of a session's history.
    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<(), ContextError>;

    /// Replace the whole history. Compaction persists its results through
    /// this, so a reader never sees a summary next to the span it replaced.
    async fn replace_all(
        &self,
        session_id: &str,
        messages: &[Message],
    ) -> Result<(), ContextError>;
}

// --- MemoryHistoryStore ---

/// In-process store for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    sessions: Mutex<HashMap<String, Vec<Message>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Message>>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn read_all(&self, session_id: &str) -> Result<Vec<Message>, ContextError> {
        Ok(self.lock().get(session_id).cloned().unwrap_or_default())
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<(), ContextError> {
        self.lock()
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn replace_all(
        &self,
        session_id: &str,
        messages: &[Message],
    ) -> Result<(), ContextError> {
        self.lock().insert(session_id.to_string(), messages.to_vec());
        Ok(())
    }
}

// --- FileHistoryStore ---

/// One JSON document per session under a directory.
pub struct FileHistoryStore {
    dir: PathBuf,
}

impl FileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    async fn write(&self, session_id: &str, messages: &[Message]) -> Result<(), ContextError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ContextError::Store(e.to_string()))?;
        let json = serde_json::to_string_pretty(messages)
            .map_err(|e| ContextError::Store(e.to_string()))?;
        tokio::fs::write(self.path(session_id), json)
            .await
            .map_err(|e| ContextError::Store(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn read_all(&self, session_id: &str) -> Result<Vec<Message>, ContextError> {
        match tokio::fs::read_to_string(self.path(session_id)).await {
            Ok(json) => {
                serde_json::from_str(&json).map_err(|e| ContextError::Store(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ContextError::Store(e.to_string())),
        }
    }

    async fn append(&self, session_id: &str, messages: &[Message]) -> Result<(), ContextError> {
        let mut history = self.read_all(session_id).await?;
        history.extend_from_slice(messages);
        self.write(session_id, &history).await
    }

    async fn replace_all(
        &self,
        session_id: &str,
        messages: &[Message],
    ) -> Result<(), ContextError> {
        self.write(session_id, messages).await
    }
}
