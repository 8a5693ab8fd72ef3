//! Conversation sessions: per-conversation ordered message history, kept in
//! memory and persisted as JSON files under `<workspace>/sessions/`.
//!
//! Keys are ConversationKeys (`channel:chat_id`). System-trigger channels
//! (heartbeat, cron) never reach this store; the agent loop gives them an
//! ephemeral session instead.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A single stored turn (role + text). Tool transcripts are per-turn working
/// state and are not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: String,
    pub content: String,
}

/// One conversation: key and ordered history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
}

impl Session {
    /// Blank session that is never persisted (system-trigger channels).
    pub fn ephemeral(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            messages: Vec::new(),
        }
    }

    pub fn add_message(&mut self, role: impl Into<String>, content: impl Into<String>) {
        self.messages.push(SessionMessage {
            role: role.into(),
            content: content.into(),
        });
    }
}

/// In-memory session map with optional file persistence.
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
    storage_dir: Option<PathBuf>,
}

impl SessionStore {
    /// Store persisting to `<workspace>/sessions/`. The directory is created
    /// lazily on first save.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            storage_dir: Some(workspace.into().join("sessions")),
        }
    }

    /// In-memory only (tests, one-shot runs).
    pub fn new_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            storage_dir: None,
        }
    }

    /// Return the session for `key`, loading it from disk if present, or a
    /// new empty one.
    pub async fn get_or_create(&self, key: &str) -> Session {
        if let Some(s) = self.inner.read().await.get(key) {
            return s.clone();
        }
        let session = match self.load_from_disk(key).await {
            Some(s) => s,
            None => Session {
                key: key.to_string(),
                messages: Vec::new(),
            },
        };
        self.inner
            .write()
            .await
            .insert(key.to_string(), session.clone());
        session
    }

    /// Persist the session: update the in-memory map and, when a storage dir
    /// is configured, overwrite the session file. Idempotent.
    pub async fn save(&self, session: &Session) -> Result<(), String> {
        self.inner
            .write()
            .await
            .insert(session.key.clone(), session.clone());
        let Some(ref dir) = self.storage_dir else {
            return Ok(());
        };
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("creating sessions dir: {}", e))?;
        let path = dir.join(file_name(&session.key));
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| format!("serializing session {}: {}", session.key, e))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| format!("writing {}: {}", path.display(), e))
    }

    /// Path of the persisted file for `key`, when persistence is configured.
    pub fn session_path(&self, key: &str) -> Option<PathBuf> {
        self.storage_dir.as_ref().map(|d| d.join(file_name(key)))
    }

    async fn load_from_disk(&self, key: &str) -> Option<Session> {
        let path = self.session_path(key)?;
        let data = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str::<Session>(&data) {
            Ok(s) => Some(s),
            Err(e) => {
                log::warn!("session: ignoring corrupt file {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// ConversationKeys contain `:` (and chat ids could contain separators);
/// flatten to a safe flat file name.
fn file_name(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    format!("{}.json", safe)
}
