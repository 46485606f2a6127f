//! File-backed session store.
//!
//! CLI invocations are separate processes, so live sessions must survive
//! between them. This store keeps the live set in a JSON file under the
//! spoor home directory, reloaded on every access; last writer wins, which
//! is safe because sessions partition by agent ID.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::warn;

use spoor_protocol::{Session, SessionStore};

/// Session store persisted to a JSON file.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl FileSessionStore {
    /// Create a store over the given file. The file is created on first
    /// write.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            io: Mutex::new(()),
        }
    }

    fn load(&self) -> HashMap<String, Session> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!(path = %self.path.display(), %err, "unreadable session file, starting empty");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        }
    }

    fn save(&self, sessions: &HashMap<String, Session>) {
        if let Some(parent) = self.path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), %err, "cannot create session directory");
                return;
            }
        }
        match serde_json::to_string_pretty(sessions) {
            Ok(json) => {
                if let Err(err) = std::fs::write(&self.path, json) {
                    warn!(path = %self.path.display(), %err, "cannot persist sessions");
                }
            }
            Err(err) => warn!(%err, "cannot serialize sessions"),
        }
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, agent_id: &str) -> Option<Session> {
        let _guard = self.io.lock();
        self.load().get(agent_id).cloned()
    }

    fn upsert(&self, session: Session) {
        let _guard = self.io.lock();
        let mut sessions = self.load();
        let _ = sessions.insert(session.agent_id.to_string(), session);
        self.save(&sessions);
    }

    fn remove(&self, agent_id: &str) -> Option<Session> {
        let _guard = self.io.lock();
        let mut sessions = self.load();
        let removed = sessions.remove(agent_id);
        if removed.is_some() {
            self.save(&sessions);
        }
        removed
    }

    fn live(&self) -> Vec<Session> {
        let _guard = self.io.lock();
        self.load().into_values().collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileSessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions.json"));
        (dir, store)
    }

    #[test]
    fn empty_store_has_no_sessions() {
        let (_dir, store) = store();
        assert!(store.get("crow").is_none());
        assert!(store.live().is_empty());
    }

    #[test]
    fn sessions_survive_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let first = FileSessionStore::new(path.clone());
        first.upsert(Session::open("crow", "a1b2c3d4e5f60718", "0AF3C9"));

        // Simulates a second CLI invocation.
        let second = FileSessionStore::new(path);
        let session = second.get("crow").unwrap();
        assert_eq!(session.session_id.as_str(), "a1b2c3d4e5f60718");
        assert_eq!(session.perceive_nonce.as_deref(), Some("0AF3C9"));
    }

    #[test]
    fn remove_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let first = FileSessionStore::new(path.clone());
        first.upsert(Session::open("crow", "a1b2c3d4e5f60718", "0AF3C9"));
        let _ = first.remove("crow").unwrap();

        let second = FileSessionStore::new(path);
        assert!(second.get("crow").is_none());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "{broken").unwrap();

        let store = FileSessionStore::new(path);
        assert!(store.live().is_empty());
    }
}
