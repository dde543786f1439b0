//! Session manager backed by a [`LocalStore`]

use crate::message::ChatMessage;
use crate::store::LocalStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store key holding the raw session id
pub const SESSION_ID_KEY: &str = "chat_session_id";
/// Store key holding the JSON-encoded message log
pub const MESSAGES_KEY: &str = "chat_message";

/// State restored from the store at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// Owns persistence of the session id and the message log
pub struct SessionManager {
    store: Arc<dyn LocalStore>,
    ready: bool,
    /// Last session id written to the store
    persisted_id: Option<String>,
}

impl SessionManager {
    /// Create a new session manager over a store
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            ready: false,
            persisted_id: None,
        }
    }

    /// Load the persisted session id and message log.
    ///
    /// Never fails: unreadable or corrupt values are treated as absent. The
    /// manager is ready once this returns.
    pub fn load(&mut self) -> SessionSnapshot {
        let session_id = match self.store.get(SESSION_ID_KEY) {
            Ok(Some(raw)) if !raw.trim().is_empty() => Some(raw.trim().to_string()),
            Ok(Some(_)) => {
                warn!("Ignoring blank persisted session id");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read persisted session id: {}", e);
                None
            }
        };

        let mut messages = match self.store.get(MESSAGES_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<Vec<ChatMessage>>(&raw).unwrap_or_else(|e| {
                warn!("Discarding corrupt persisted message log: {}", e);
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read persisted message log: {}", e);
                Vec::new()
            }
        };

        // A log saved mid-stream has no turn left to finish it
        for msg in messages.iter_mut().filter(|m| m.is_typing) {
            debug!("Finalizing message {} left typing by a previous run", msg.id);
            msg.is_typing = false;
        }

        self.persisted_id = session_id.clone();
        if !self.ready {
            self.ready = true;
            info!(
                "Session ready (session_id: {:?}, {} messages)",
                session_id,
                messages.len()
            );
        }

        SessionSnapshot {
            session_id,
            messages,
        }
    }

    /// Whether [`load`](Self::load) has completed
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Persist the session id if it differs from the last one written
    pub fn persist_session_id(&mut self, id: &str) {
        if self.persisted_id.as_deref() == Some(id) {
            return;
        }
        match self.store.set(SESSION_ID_KEY, id) {
            Ok(()) => self.persisted_id = Some(id.to_string()),
            Err(e) => warn!("Failed to persist session id: {}", e),
        }
    }

    /// Persist the full message log
    pub fn persist_messages(&self, messages: &[ChatMessage]) {
        let encoded = match serde_json::to_string(messages) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode message log: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(MESSAGES_KEY, &encoded) {
            warn!("Failed to persist message log: {}", e);
        }
    }

    /// Remove both persisted keys
    pub fn clear(&mut self) {
        self.persisted_id = None;
        for key in [SESSION_ID_KEY, MESSAGES_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!("Failed to remove {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Sender;
    use crate::store::{FileStore, MemoryStore};
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Memory store that records every write
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStore,
        writes: Mutex<Vec<(String, String)>>,
    }

    impl LocalStore for RecordingStore {
        fn get(&self, key: &str) -> crate::Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> crate::Result<()> {
            self.writes.lock().push((key.to_string(), value.to_string()));
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> crate::Result<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_load_empty_store() {
        let mut manager = SessionManager::new(Arc::new(MemoryStore::new()));
        assert!(!manager.is_ready());

        let snapshot = manager.load();
        assert!(manager.is_ready());
        assert_eq!(snapshot, SessionSnapshot::default());
    }

    #[test]
    fn test_load_restores_persisted_state() {
        let store = Arc::new(MemoryStore::new());
        let log = vec![ChatMessage::user("a"), ChatMessage::new(Sender::Assistant, "b")];
        store.set(SESSION_ID_KEY, "s1").unwrap();
        store
            .set(MESSAGES_KEY, &serde_json::to_string(&log).unwrap())
            .unwrap();

        let snapshot = SessionManager::new(store).load();
        assert_eq!(snapshot.session_id.as_deref(), Some("s1"));
        assert_eq!(snapshot.messages, log);
    }

    #[test]
    fn test_corrupt_state_is_treated_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.set(SESSION_ID_KEY, "   ").unwrap();
        store.set(MESSAGES_KEY, "{not a list").unwrap();

        let snapshot = SessionManager::new(store).load();
        assert_eq!(snapshot, SessionSnapshot::default());
    }

    #[test]
    fn test_load_finalizes_typing_messages() {
        let store = Arc::new(MemoryStore::new());
        let mut partial = ChatMessage::typing_assistant();
        partial.text = "Hal".to_string();
        store
            .set(MESSAGES_KEY, &serde_json::to_string(&vec![partial]).unwrap())
            .unwrap();

        let snapshot = SessionManager::new(store).load();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].text, "Hal");
        assert!(!snapshot.messages[0].is_typing);
    }

    #[test]
    fn test_session_id_written_only_on_change() {
        let store = Arc::new(RecordingStore::default());
        let mut manager = SessionManager::new(store.clone());
        manager.load();

        manager.persist_session_id("s1");
        manager.persist_session_id("s1");
        manager.persist_session_id("s2");

        let writes = store.writes.lock();
        let ids: Vec<&str> = writes
            .iter()
            .filter(|(k, _)| k == SESSION_ID_KEY)
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[test]
    fn test_restored_session_id_is_not_rewritten() {
        let store = Arc::new(RecordingStore::default());
        store.inner.set(SESSION_ID_KEY, "s1").unwrap();
        let mut manager = SessionManager::new(store.clone());
        manager.load();

        manager.persist_session_id("s1");
        assert!(store.writes.lock().is_empty());
    }

    #[test]
    fn test_messages_written_unconditionally() {
        let store = Arc::new(RecordingStore::default());
        let manager = SessionManager::new(store.clone());
        let log = vec![ChatMessage::user("hi")];

        manager.persist_messages(&log);
        manager.persist_messages(&log);
        assert_eq!(store.writes.lock().len(), 2);
    }

    #[test]
    fn test_clear_round_trips_to_empty_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(temp_dir.path()));
        let mut manager = SessionManager::new(store.clone());
        manager.load();
        manager.persist_session_id("s1");
        manager.persist_messages(&[ChatMessage::user("hi")]);

        manager.clear();

        let snapshot = SessionManager::new(store).load();
        assert_eq!(snapshot, SessionSnapshot::default());
    }

    #[test]
    fn test_clear_forgets_last_written_id() {
        let store = Arc::new(RecordingStore::default());
        let mut manager = SessionManager::new(store.clone());
        manager.persist_session_id("s1");
        manager.clear();
        manager.persist_session_id("s1");

        assert_eq!(store.writes.lock().len(), 2);
        assert_eq!(
            store.inner.get(SESSION_ID_KEY).unwrap().as_deref(),
            Some("s1")
        );
    }
}
