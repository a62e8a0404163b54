//! In-memory session store keyed by actor id.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::debug;

use crate::types::Session;

/// Shared handle to one actor's session.
///
/// Holding the lock for a whole request serializes same-actor requests.
pub type SessionHandle = Arc<Mutex<Session>>;

// ─────────────────────────────────────────────
// SessionStore
// ─────────────────────────────────────────────

/// Creates sessions lazily and discards them on reset.
///
/// Thread-safe via `RwLock`: lookups share, creation and reset are exclusive.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    max_turns: usize,
}

impl SessionStore {
    /// Create a store keeping at most `max_turns` exchanges per session (0 = unbounded).
    pub fn new(max_turns: usize) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            max_turns,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Get the actor's session, creating an empty one on first use.
    pub fn get_or_create(&self, actor_id: &str) -> SessionHandle {
        {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(handle) = sessions.get(actor_id) {
                return handle.clone();
            }
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions
            .entry(actor_id.to_string())
            .or_insert_with(|| {
                debug!(actor = %actor_id, "Creating session");
                Arc::new(Mutex::new(Session::new(actor_id)))
            })
            .clone()
    }

    /// Discard the actor's session. Returns whether one existed.
    ///
    /// A request already holding the old handle finishes against the
    /// discarded session; the next request starts fresh.
    pub fn reset(&self, actor_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let existed = sessions.remove(actor_id).is_some();
        if existed {
            debug!(actor = %actor_id, "Session reset");
        }
        existed
    }

    pub fn contains(&self, actor_id: &str) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(actor_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[tokio::test]
    async fn test_get_or_create_is_lazy_and_stable() {
        let store = SessionStore::new(5);
        assert!(store.is_empty());

        let a = store.get_or_create("actor-1");
        let b = store.get_or_create("actor-1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
        assert_eq!(a.lock().await.actor_id, "actor-1");
    }

    #[tokio::test]
    async fn test_sessions_are_per_actor() {
        let store = SessionStore::new(5);
        store
            .get_or_create("a")
            .lock()
            .await
            .record(vec![Message::user("hi")], 5);

        assert_eq!(store.get_or_create("a").lock().await.turn_count(), 1);
        assert_eq!(store.get_or_create("b").lock().await.turn_count(), 0);
    }

    #[tokio::test]
    async fn test_reset_discards_history() {
        let store = SessionStore::new(5);
        store
            .get_or_create("a")
            .lock()
            .await
            .record(vec![Message::user("hi")], 5);

        assert!(store.reset("a"));
        assert!(!store.contains("a"));
        assert!(!store.reset("a"));
        assert_eq!(store.get_or_create("a").lock().await.turn_count(), 0);
    }
}
