//! Session Persistence
//!
//! Persists and restores the ordered turn sequence across process restarts.
//! Writes are whole-snapshot replacements; a missing, corrupt or too-new
//! snapshot loads as an empty conversation.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Turn};

/// Snapshot schema version written by this build
pub const SNAPSHOT_VERSION: u32 = 1;

/// Default snapshot file name, relative to the sandbox root
pub const SNAPSHOT_FILE: &str = "session_state.json";

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// On-disk envelope around the turn sequence
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    session_id: SessionId,
    saved_at: DateTime<Utc>,
    turns: Vec<Turn>,
}

/// Conversation store trait for persistence
pub trait ConversationStore: Send + Sync {
    /// Load the current snapshot (empty conversation if there is none)
    fn load(&self) -> Result<Conversation>;

    /// Replace the snapshot with `conversation`
    fn save(&self, conversation: &Conversation) -> Result<()>;

    /// Drop the snapshot
    fn clear(&self) -> Result<()>;
}

/// JSON file store
pub struct FileConversationStore {
    path: PathBuf,
}

impl FileConversationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default snapshot location inside `root`
    pub fn in_dir(root: &Path) -> Self {
        Self::new(root.join(SNAPSHOT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Conversation, String> {
        #[derive(Deserialize)]
        struct Header {
            version: u32,
        }

        let header: Header = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        if header.version > SNAPSHOT_VERSION {
            return Err(format!(
                "snapshot version {} is newer than supported version {}",
                header.version, SNAPSHOT_VERSION
            ));
        }

        let snapshot: Snapshot = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        Ok(Conversation::from_parts(snapshot.session_id, snapshot.turns))
    }
}

impl ConversationStore for FileConversationStore {
    fn load(&self) -> Result<Conversation> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Conversation::new()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Cannot read conversation snapshot, starting a new session");
                return Ok(Conversation::new());
            }
        };

        match Self::decode(&bytes) {
            Ok(conversation) => {
                tracing::debug!(turns = conversation.len(), "Restored conversation snapshot");
                Ok(conversation)
            }
            Err(reason) => {
                tracing::warn!(path = %self.path.display(), %reason, "Discarding unreadable conversation snapshot");
                Ok(Conversation::new())
            }
        }
    }

    fn save(&self, conversation: &Conversation) -> Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            session_id: conversation.id().clone(),
            saved_at: Utc::now(),
            turns: conversation.turns().to_vec(),
        };
        let buf = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Write beside the snapshot, then rename over it.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, buf)
            .map_err(|e| AgentError::Store(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| AgentError::Store(format!("replace {}: {e}", self.path.display())))?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("Conversation memory cleared, starting a new session");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store (for development/testing)
#[derive(Default)]
pub struct MemoryConversationStore {
    snapshot: RwLock<Option<Conversation>>,
    saves: RwLock<usize>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversation(conversation: Conversation) -> Self {
        Self {
            snapshot: RwLock::new(Some(conversation)),
            saves: RwLock::new(0),
        }
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.read().map_or(0, |n| *n)
    }
}

fn poisoned<T>(_: T) -> AgentError {
    AgentError::Store("memory store lock poisoned".into())
}

impl ConversationStore for MemoryConversationStore {
    fn load(&self) -> Result<Conversation> {
        let snapshot = self.snapshot.read().map_err(poisoned)?;
        Ok(snapshot.clone().unwrap_or_default())
    }

    fn save(&self, conversation: &Conversation) -> Result<()> {
        *self.snapshot.write().map_err(poisoned)? = Some(conversation.clone());
        *self.saves.write().map_err(poisoned)? += 1;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.snapshot.write().map_err(poisoned)? = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Part, Role};
    use serde_json::{Map, json};

    fn sample_conversation() -> Conversation {
        let mut args = Map::new();
        args.insert("file_path".into(), json!("notes.txt"));

        let mut conv = Conversation::new();
        conv.push(Turn::new(
            Role::User,
            vec![Part::text("Summarise notes.txt"), Part::media("image/png", vec![1, 2, 3])],
        ));
        conv.push(Turn::new(
            Role::Model,
            vec![
                Part::call("get_file_content", args.clone()),
                Part::call("run_python_file", args),
            ],
        ));
        conv.push(Turn::tool(vec![
            Part::function_result("get_file_content", "hello"),
            Part::function_error("run_python_file", "User denied execution of this function."),
        ]));
        conv.push(Turn::model("The file says hello."));
        conv
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConversationStore::in_dir(dir.path());
        let conv = sample_conversation();

        store.save(&conv).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, conv);
        assert_eq!(loaded.turns()[2].parts.len(), 2);
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConversationStore::in_dir(dir.path());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConversationStore::in_dir(dir.path());
        std::fs::write(store.path(), b"{not json").unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_newer_snapshot_version_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConversationStore::in_dir(dir.path());
        let future = json!({
            "version": SNAPSHOT_VERSION + 1,
            "session_id": "abc",
            "saved_at": "2026-01-01T00:00:00Z",
            "turns": [],
            "branches": {}
        });
        std::fs::write(store.path(), future.to_string()).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_replaces_whole_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConversationStore::in_dir(dir.path());
        store.save(&sample_conversation()).unwrap();

        let mut short = Conversation::new();
        short.push(Turn::user("fresh"));
        store.save(&short).unwrap();

        assert_eq!(store.load().unwrap(), short);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_clear_removes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConversationStore::in_dir(dir.path());
        store.save(&sample_conversation()).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryConversationStore::new();
        let conv = sample_conversation();

        store.save(&conv).unwrap();

        assert_eq!(store.load().unwrap(), conv);
        assert_eq!(store.save_count(), 1);
    }
}
