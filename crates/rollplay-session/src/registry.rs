//! Process-wide map from session id to live session.

use std::collections::HashMap;
use std::sync::Arc;

use rollplay_protocol::SessionId;
use rollplay_store::Persistence;
use tokio::sync::Mutex;

use crate::{ActiveSession, ConnectionHandle, SessionError};

/// Tracks every live [`ActiveSession`].
///
/// The map lock is only held to look up, insert, or remove entries; all
/// per-session work happens on the session's own lock. Creating a session
/// talks to the store, so it runs behind a per-id gate instead: two first
/// joins of the same session queue up, joins of different sessions don't.
/// No lock is held while waiting on a session's lock.
///
/// ## Lifecycle
///
/// ```text
/// join() ──→ get_or_create() ──→ [Live] ──→ leave() of last connection
///                                               │
///                                               ▼
///                                  [Retired] flush ──→ removed from map
/// ```
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<ActiveSession>>>,
    creating: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the live session for `id`, creating it from the store if
    /// there is none.
    ///
    /// Creation runs behind the gate for `id`, so two simultaneous first
    /// joins get the same session. A retired entry that hasn't been
    /// removed yet is replaced, after waiting for its flush so the fresh
    /// session reads the final turn marker.
    ///
    /// # Errors
    /// [`SessionError::SessionNotFound`] if the store has no such session.
    pub async fn get_or_create<P: Persistence>(
        &self,
        store: &P,
        id: SessionId,
    ) -> Result<Arc<ActiveSession>, SessionError> {
        if let Some(live) = self.get(id).await {
            return Ok(live);
        }

        let gate = Arc::clone(self.creating.lock().await.entry(id).or_default());
        let result = {
            let _creating = gate.lock().await;
            self.create(store, id).await
        };

        let mut creating = self.creating.lock().await;
        // One reference is the map's and one is ours; any other belongs to
        // a caller still queued on this gate.
        if Arc::strong_count(&gate) == 2 {
            creating.remove(&id);
        }
        result
    }

    /// Loads session `id` and publishes it. Runs behind the id's gate.
    async fn create<P: Persistence>(
        &self,
        store: &P,
        id: SessionId,
    ) -> Result<Arc<ActiveSession>, SessionError> {
        let stale = {
            let sessions = self.sessions.lock().await;
            match sessions.get(&id) {
                // Someone ahead of us on the gate already created it.
                Some(existing) if !existing.is_retired() => return Ok(Arc::clone(existing)),
                other => other.cloned(),
            }
        };
        if let Some(stale) = stale {
            stale.settle().await;
        }

        let record = store
            .find_session(id)
            .await?
            .ok_or(SessionError::SessionNotFound(id))?;
        store.set_session_active(id, true).await?;
        let session = Arc::new(ActiveSession::from_record(&record));
        self.sessions.lock().await.insert(id, Arc::clone(&session));
        tracing::info!(session_id = %id, map_id = %record.map_id, "session activated");
        Ok(session)
    }

    /// Returns the live session for `id`, if any.
    pub async fn get(&self, id: SessionId) -> Option<Arc<ActiveSession>> {
        self.sessions
            .lock()
            .await
            .get(&id)
            .filter(|s| !s.is_retired())
            .cloned()
    }

    /// Drops the entry for `id` unconditionally.
    pub async fn remove(&self, id: SessionId) -> Option<Arc<ActiveSession>> {
        self.sessions.lock().await.remove(&id)
    }

    /// Drops `session`'s entry unless it has already been replaced.
    async fn remove_if_same(&self, session: &Arc<ActiveSession>) {
        let mut sessions = self.sessions.lock().await;
        if sessions
            .get(&session.id())
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            sessions.remove(&session.id());
            tracing::debug!(session_id = %session.id(), "session removed from registry");
        }
    }

    /// Joins `handle` to session `id`, creating the session if needed.
    ///
    /// Retries on a fresh session if the one found retires in between. If
    /// the join fails after the connection was registered, the connection
    /// is removed again before the error is returned.
    pub async fn join<P: Persistence>(
        &self,
        store: &P,
        id: SessionId,
        handle: ConnectionHandle,
    ) -> Result<Arc<ActiveSession>, SessionError> {
        loop {
            let session = self.get_or_create(store, id).await?;
            match session.join(store, handle.clone()).await {
                Ok(()) => return Ok(session),
                Err(SessionError::Retired(_)) => {
                    tracing::debug!(session_id = %id, "session retired during join, retrying");
                }
                Err(e) => {
                    if let Err(undo) = self.leave(store, &session, &handle).await {
                        tracing::warn!(session_id = %id, error = %undo, "rollback after failed join also failed");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Removes `handle` from `session`, dropping the session from the
    /// registry if that was its last connection.
    ///
    /// The entry is removed even if the final flush to the store fails;
    /// the flush error is still returned.
    pub async fn leave<P: Persistence>(
        &self,
        store: &P,
        session: &Arc<ActiveSession>,
        handle: &ConnectionHandle,
    ) -> Result<(), SessionError> {
        let result = session.leave(store, handle).await;
        if session.is_retired() {
            self.remove_if_same(session).await;
        }
        if let Err(e) = &result {
            tracing::error!(session_id = %session.id(), error = %e, "leave failed");
        }
        result.map(|_| ())
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use rollplay_protocol::{Character, CharacterId, MapId, UserId};
    use rollplay_store::{MemoryStore, NewCharacter, SessionRecord, StoreError, User};
    use rollplay_transport::ConnectionId;

    use crate::outbound_channel;

    use super::*;

    /// A [`MemoryStore`] with scripted misbehaviour.
    #[derive(Default)]
    struct ScriptedStore {
        inner: MemoryStore,
        slow_session: Option<SessionId>,
        fail_turn_marker: bool,
    }

    impl Persistence for ScriptedStore {
        async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
            self.inner.find_user(id).await
        }

        async fn find_character(&self, id: CharacterId) -> Result<Option<Character>, StoreError> {
            self.inner.find_character(id).await
        }

        async fn find_session(&self, id: SessionId) -> Result<Option<SessionRecord>, StoreError> {
            if self.slow_session == Some(id) {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            self.inner.find_session(id).await
        }

        async fn persist_character_position(
            &self,
            id: CharacterId,
            row: i32,
            col: i32,
        ) -> Result<Character, StoreError> {
            self.inner.persist_character_position(id, row, col).await
        }

        async fn create_character(&self, new: NewCharacter) -> Result<Character, StoreError> {
            self.inner.create_character(new).await
        }

        async fn delete_character(&self, id: CharacterId) -> Result<bool, StoreError> {
            self.inner.delete_character(id).await
        }

        async fn characters_of_user_in_session(
            &self,
            user_id: UserId,
            session_id: SessionId,
        ) -> Result<Vec<Character>, StoreError> {
            self.inner.characters_of_user_in_session(user_id, session_id).await
        }

        async fn set_session_active(&self, id: SessionId, active: bool) -> Result<(), StoreError> {
            self.inner.set_session_active(id, active).await
        }

        async fn persist_turn_marker(
            &self,
            id: SessionId,
            last_moved: Option<CharacterId>,
        ) -> Result<(), StoreError> {
            if self.fail_turn_marker {
                return Err(StoreError::Backend("turn marker write refused".into()));
            }
            self.inner.persist_turn_marker(id, last_moved).await
        }
    }

    fn handle(conn: u64, user: u64) -> ConnectionHandle {
        let (tx, _rx) = outbound_channel();
        ConnectionHandle::new(ConnectionId::new(conn), UserId(user), tx)
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let record = store.add_session(MapId(1)).await;
        let registry = SessionRegistry::new();

        let a = registry.get_or_create(&store, record.id).await.unwrap();
        let b = registry.get_or_create(&store, record.id).await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);
        assert!(store.find_session(record.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_get_or_create_unknown_session_fails() {
        let store = MemoryStore::new();
        let registry = SessionRegistry::new();

        let err = registry.get_or_create(&store, SessionId(99)).await.unwrap_err();

        assert!(matches!(err, SessionError::SessionNotFound(SessionId(99))));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let registry = SessionRegistry::new();
        assert!(registry.get(SessionId(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_drops_entry() {
        let store = MemoryStore::new();
        let record = store.add_session(MapId(1)).await;
        let registry = SessionRegistry::new();
        registry.get_or_create(&store, record.id).await.unwrap();

        assert!(registry.remove(record.id).await.is_some());
        assert!(registry.get(record.id).await.is_none());
    }

    #[tokio::test]
    async fn test_leave_last_connection_removes_session() {
        let store = MemoryStore::new();
        store.add_user(UserId(1), "alice").await;
        let record = store.add_session(MapId(1)).await;
        let registry = SessionRegistry::new();
        let conn = handle(1, 1);

        let session = registry.join(&store, record.id, conn.clone()).await.unwrap();
        registry.leave(&store, &session, &conn).await.unwrap();

        assert!(session.is_retired());
        assert!(registry.get(record.id).await.is_none());
        assert!(!store.find_session(record.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_join_after_retire_creates_fresh_session() {
        let store = MemoryStore::new();
        store.add_user(UserId(1), "alice").await;
        let record = store.add_session(MapId(1)).await;
        let registry = SessionRegistry::new();
        let first = handle(1, 1);
        let old = registry.join(&store, record.id, first.clone()).await.unwrap();
        registry.leave(&store, &old, &first).await.unwrap();

        let fresh = registry.join(&store, record.id, handle(2, 1)).await.unwrap();

        assert!(!Arc::ptr_eq(&old, &fresh));
        assert!(!fresh.is_retired());
    }

    #[tokio::test]
    async fn test_leave_of_replaced_session_keeps_new_entry() {
        let store = MemoryStore::new();
        store.add_user(UserId(1), "alice").await;
        let record = store.add_session(MapId(1)).await;
        let registry = SessionRegistry::new();
        let conn = handle(1, 1);
        let old = registry.join(&store, record.id, conn.clone()).await.unwrap();
        old.leave(&store, &conn).await.unwrap();
        // The stale entry is replaced before the old leave reaches the registry.
        let fresh = registry.join(&store, record.id, handle(2, 1)).await.unwrap();

        registry.remove_if_same(&old).await;

        let current = registry.get(record.id).await.unwrap();
        assert!(Arc::ptr_eq(&current, &fresh));
    }

    #[tokio::test]
    async fn test_get_or_create_slow_store_does_not_block_other_sessions() {
        let mut store = ScriptedStore::default();
        let slow = store.inner.add_session(MapId(1)).await.id;
        let fast = store.inner.add_session(MapId(1)).await.id;
        store.slow_session = Some(slow);
        let store = Arc::new(store);
        let registry = Arc::new(SessionRegistry::new());

        let pending = {
            let (store, registry) = (Arc::clone(&store), Arc::clone(&registry));
            tokio::spawn(async move { registry.get_or_create(&*store, slow).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        registry.get_or_create(&*store, fast).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(registry.get(fast).await.is_some());

        pending.await.unwrap().unwrap();
        assert_eq!(registry.len().await, 2);
        assert!(registry.creating.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_get_or_create_concurrent_first_calls_share_session() {
        let mut store = ScriptedStore::default();
        let id = store.inner.add_session(MapId(1)).await.id;
        store.slow_session = Some(id);
        let store = Arc::new(store);
        let registry = Arc::new(SessionRegistry::new());

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let (store, registry) = (Arc::clone(&store), Arc::clone(&registry));
                tokio::spawn(async move { registry.get_or_create(&*store, id).await })
            })
            .collect();
        let mut sessions = Vec::new();
        for task in tasks {
            sessions.push(task.await.unwrap().unwrap());
        }

        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_leave_failed_turn_marker_still_deactivates_record() {
        let mut store = ScriptedStore::default();
        store.inner.add_user(UserId(1), "alice").await;
        let record = store.inner.add_session(MapId(1)).await;
        store.fail_turn_marker = true;
        let registry = SessionRegistry::new();
        let conn = handle(1, 1);
        let session = registry.join(&store, record.id, conn.clone()).await.unwrap();

        let err = registry.leave(&store, &session, &conn).await.unwrap_err();

        assert!(matches!(err, SessionError::Store(StoreError::Backend(_))));
        assert!(session.is_retired());
        assert!(registry.get(record.id).await.is_none());
        assert!(!store.inner.find_session(record.id).await.unwrap().unwrap().active);
    }
}
