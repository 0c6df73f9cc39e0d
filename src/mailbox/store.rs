//! Backing stores for the pending mailbox.
//!
//! The file store keeps the whole list in one JSON file, `<dir>/<key>.json`.
//! Writes are atomic: serialize, write a temporary file, fsync, rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::core::{LinkError, LinkResult, MAILBOX_FILE_EXTENSION, PendingMessage};

/// Durable ordered storage for pending messages.
///
/// Implementations hold the full list under one key; the mailbox serializes
/// every call, so a store never sees two writers at once.
pub trait MailboxStore: Send + Sync {
    /// Load the stored list, oldest first. A missing list is empty.
    fn load(&self) -> LinkResult<Vec<PendingMessage>>;

    /// Replace the stored list.
    fn save(&self, messages: &[PendingMessage]) -> LinkResult<()>;

    /// Remove the stored list.
    fn clear(&self) -> LinkResult<()>;
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// JSON file store that survives process restarts.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store under `dir`, in the file named after `key`.
    pub fn new(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir
                .as_ref()
                .join(format!("{key}.{MAILBOX_FILE_EXTENSION}")),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> LinkResult<PathBuf> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| LinkError::Storage("mailbox path has no parent directory".into()))?;
        fs::create_dir_all(parent)?;

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("mailbox.json");
        Ok(parent.join(format!(".{file_name}.tmp")))
    }
}

impl MailboxStore for FileStore {
    fn load(&self) -> LinkResult<Vec<PendingMessage>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice(&raw) {
            Ok(messages) => Ok(messages),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt mailbox file, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, messages: &[PendingMessage]) -> LinkResult<()> {
        let encoded = serde_json::to_vec(messages)?;
        let tmp_path = self.tmp_path()?;

        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            LinkError::Storage(format!("failed to replace mailbox file: {e}"))
        })
    }

    fn clear(&self) -> LinkResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store. Clones share one list, which lets a test hand the same
/// store to a restarted endpoint.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    messages: Arc<Mutex<Vec<PendingMessage>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MailboxStore for MemoryStore {
    fn load(&self) -> LinkResult<Vec<PendingMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    fn save(&self, messages: &[PendingMessage]) -> LinkResult<()> {
        *self.messages.lock().unwrap_or_else(|e| e.into_inner()) = messages.to_vec();
        Ok(())
    }

    fn clear(&self) -> LinkResult<()> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    static COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_dir() -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "wearlink_store_test_{}_{}",
            std::process::id(),
            n
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn message(payload: &str) -> PendingMessage {
        PendingMessage {
            path: "/wear-message-to-phone".into(),
            payload: payload.into(),
            source_node_id: "watch".into(),
            received_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let store = FileStore::new(temp_dir(), "pending");
        assert!(store.load().unwrap().is_empty());
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_persists_order() {
        let dir = temp_dir();
        let store = FileStore::new(&dir, "pending");
        store.save(&[message("a"), message("b")]).unwrap();

        let reopened = FileStore::new(&dir, "pending");
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded, vec![message("a"), message("b")]);
        assert!(!dir.join(".pending.json.tmp").exists());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_corrupt_file_is_treated_as_empty() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        let store = FileStore::new(&dir, "pending");
        fs::write(store.path(), b"{not json").unwrap();

        assert!(store.load().unwrap().is_empty());

        store.save(&[message("fresh")]).unwrap();
        assert_eq!(store.load().unwrap(), vec![message("fresh")]);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_empty_file_is_empty() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        let store = FileStore::new(&dir, "pending");
        fs::write(store.path(), b"").unwrap();
        assert!(store.load().unwrap().is_empty());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_clear_removes_file() {
        let dir = temp_dir();
        let store = FileStore::new(&dir, "pending");
        store.save(&[message("a")]).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_memory_store_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.save(&[message("a")]).unwrap();
        assert_eq!(other.load().unwrap().len(), 1);
        other.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
