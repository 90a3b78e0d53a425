//! In-memory [`Persistence`] backend.
//!
//! Keeps every table in a single `HashMap`/`BTreeMap` set behind one async
//! mutex. Good enough for development servers and tests; nothing survives
//! a restart.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use rollplay_protocol::{Character, CharacterId, MapId, SessionId, UserId};
use tokio::sync::Mutex;

use crate::{NewCharacter, Persistence, SessionRecord, StoreError, User};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    sessions: HashMap<SessionId, SessionRecord>,
    characters: BTreeMap<CharacterId, Character>,
    next_character_id: u64,
    next_session_id: u64,
    position_writes: usize,
}

impl Tables {
    fn session_mut(
        &mut self,
        id: SessionId,
    ) -> Result<&mut SessionRecord, StoreError> {
        self.sessions.get_mut(&id).ok_or(StoreError::Missing {
            entity: "session",
            id: id.0,
        })
    }
}

/// A [`Persistence`] implementation that lives entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user.
    pub async fn add_user(&self, id: UserId, login: &str) -> User {
        let user = User {
            id,
            login: login.to_owned(),
        };
        self.tables.lock().await.users.insert(id, user.clone());
        user
    }

    /// Creates an inactive session on `map_id`, started now.
    pub async fn add_session(&self, map_id: MapId) -> SessionRecord {
        let mut tables = self.tables.lock().await;
        tables.next_session_id += 1;
        let record = SessionRecord {
            id: SessionId(tables.next_session_id),
            map_id,
            started_at: Utc::now(),
            active: false,
            last_moved: None,
        };
        tables.sessions.insert(record.id, record.clone());
        record
    }

    /// Inserts or replaces a session record verbatim.
    pub async fn insert_session(&self, record: SessionRecord) {
        let mut tables = self.tables.lock().await;
        tables.next_session_id = tables.next_session_id.max(record.id.0);
        tables.sessions.insert(record.id, record);
    }

    /// Inserts or replaces a character verbatim. Later
    /// [`create_character`](Persistence::create_character) calls allocate
    /// ids above every inserted one.
    pub async fn insert_character(&self, character: Character) {
        let mut tables = self.tables.lock().await;
        tables.next_character_id = tables.next_character_id.max(character.id.0);
        tables.characters.insert(character.id, character);
    }

    /// How many times a character position has been written.
    pub async fn position_writes(&self) -> usize {
        self.tables.lock().await.position_writes
    }
}

impl Persistence for MemoryStore {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_character(
        &self,
        id: CharacterId,
    ) -> Result<Option<Character>, StoreError> {
        Ok(self.tables.lock().await.characters.get(&id).cloned())
    }

    async fn find_session(
        &self,
        id: SessionId,
    ) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.tables.lock().await.sessions.get(&id).cloned())
    }

    async fn persist_character_position(
        &self,
        id: CharacterId,
        row: i32,
        col: i32,
    ) -> Result<Character, StoreError> {
        let mut tables = self.tables.lock().await;
        let character = tables.characters.get_mut(&id).ok_or(
            StoreError::Missing {
                entity: "character",
                id: id.0,
            },
        )?;
        character.row = row;
        character.col = col;
        let updated = character.clone();
        tables.position_writes += 1;
        Ok(updated)
    }

    async fn create_character(
        &self,
        new: NewCharacter,
    ) -> Result<Character, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&new.user_id) {
            return Err(StoreError::Missing {
                entity: "user",
                id: new.user_id.0,
            });
        }
        tables.next_character_id += 1;
        let character = Character {
            id: CharacterId(tables.next_character_id),
            user_id: new.user_id,
            session_id: new.session_id,
            name: new.name,
            row: new.row,
            col: new.col,
            properties: new.properties,
        };
        tables.characters.insert(character.id, character.clone());
        tracing::debug!(id = %character.id, "character stored");
        Ok(character)
    }

    async fn delete_character(&self, id: CharacterId) -> Result<bool, StoreError> {
        Ok(self.tables.lock().await.characters.remove(&id).is_some())
    }

    async fn characters_of_user_in_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<Vec<Character>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .characters
            .values()
            .filter(|c| c.user_id == user_id && c.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn set_session_active(
        &self,
        id: SessionId,
        active: bool,
    ) -> Result<(), StoreError> {
        self.tables.lock().await.session_mut(id)?.active = active;
        Ok(())
    }

    async fn persist_turn_marker(
        &self,
        id: SessionId,
        last_moved: Option<CharacterId>,
    ) -> Result<(), StoreError> {
        self.tables.lock().await.session_mut(id)?.last_moved = last_moved;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_character(user: u64, session: SessionId) -> NewCharacter {
        NewCharacter {
            user_id: UserId(user),
            session_id: session,
            name: "Dovakin".into(),
            row: 0,
            col: 0,
            properties: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_create_character_allocates_increasing_ids() {
        let store = MemoryStore::new();
        store.add_user(UserId(1), "alice").await;
        let session = store.add_session(MapId(1)).await;

        let a = store.create_character(new_character(1, session.id)).await.unwrap();
        let b = store.create_character(new_character(1, session.id)).await.unwrap();

        assert!(a.id < b.id);
    }

    #[tokio::test]
    async fn test_create_character_unknown_user_is_missing() {
        let store = MemoryStore::new();
        let session = store.add_session(MapId(1)).await;

        let result = store.create_character(new_character(9, session.id)).await;

        assert!(matches!(
            result,
            Err(StoreError::Missing { entity: "user", id: 9 })
        ));
    }

    #[tokio::test]
    async fn test_create_character_skips_inserted_ids() {
        let store = MemoryStore::new();
        store.add_user(UserId(1), "alice").await;
        store
            .insert_character(Character {
                id: CharacterId(40),
                user_id: UserId(1),
                session_id: SessionId(1),
                name: "old".into(),
                row: 0,
                col: 0,
                properties: BTreeMap::new(),
            })
            .await;

        let c = store.create_character(new_character(1, SessionId(1))).await.unwrap();

        assert_eq!(c.id, CharacterId(41));
    }

    #[tokio::test]
    async fn test_persist_position_updates_and_counts() {
        let store = MemoryStore::new();
        store.add_user(UserId(1), "alice").await;
        let c = store.create_character(new_character(1, SessionId(1))).await.unwrap();

        let moved = store.persist_character_position(c.id, 4, 5).await.unwrap();

        assert_eq!((moved.row, moved.col), (4, 5));
        assert_eq!(store.position_writes().await, 1);
        let stored = store.find_character(c.id).await.unwrap().unwrap();
        assert_eq!((stored.row, stored.col), (4, 5));
    }

    #[tokio::test]
    async fn test_persist_position_missing_character() {
        let store = MemoryStore::new();
        let result = store.persist_character_position(CharacterId(3), 0, 0).await;
        assert!(matches!(result, Err(StoreError::Missing { entity: "character", .. })));
        assert_eq!(store.position_writes().await, 0);
    }

    #[tokio::test]
    async fn test_characters_of_user_in_session_filters_both_keys() {
        let store = MemoryStore::new();
        store.add_user(UserId(1), "alice").await;
        store.add_user(UserId(2), "bob").await;
        let s1 = SessionId(1);
        let s2 = SessionId(2);
        let mine = store.create_character(new_character(1, s1)).await.unwrap();
        store.create_character(new_character(1, s2)).await.unwrap();
        store.create_character(new_character(2, s1)).await.unwrap();

        let found = store.characters_of_user_in_session(UserId(1), s1).await.unwrap();

        assert_eq!(found, vec![mine]);
    }

    #[tokio::test]
    async fn test_delete_character_reports_existence() {
        let store = MemoryStore::new();
        store.add_user(UserId(1), "alice").await;
        let c = store.create_character(new_character(1, SessionId(1))).await.unwrap();

        assert!(store.delete_character(c.id).await.unwrap());
        assert!(!store.delete_character(c.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_session_flags_round_trip_through_store() {
        let store = MemoryStore::new();
        let session = store.add_session(MapId(3)).await;

        store.set_session_active(session.id, true).await.unwrap();
        store.persist_turn_marker(session.id, Some(CharacterId(8))).await.unwrap();

        let record = store.find_session(session.id).await.unwrap().unwrap();
        assert!(record.active);
        assert_eq!(record.last_moved, Some(CharacterId(8)));
    }

    #[tokio::test]
    async fn test_session_flags_on_unknown_session_fail() {
        let store = MemoryStore::new();
        let result = store.set_session_active(SessionId(5), true).await;
        assert!(matches!(result, Err(StoreError::Missing { entity: "session", id: 5 })));
    }
}
