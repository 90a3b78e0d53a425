//! The persistence contract consumed by the session engine.
//!
//! Rollplay doesn't implement storage itself. A backend (SQL database,
//! document store, the bundled [`MemoryStore`](crate::MemoryStore))
//! implements [`Persistence`], and the server calls it at the points where
//! in-memory session state must be read from or written back to storage.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rollplay_protocol::{Character, CharacterId, MapId, SessionId, UserId};

use crate::StoreError;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub login: String,
}

/// A persisted game session.
///
/// `active` and `last_moved` are authoritative in memory while the session
/// is live and are flushed back when the last connection leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: SessionId,
    pub map_id: MapId,
    pub started_at: DateTime<Utc>,
    pub active: bool,
    pub last_moved: Option<CharacterId>,
}

/// Everything needed to create a character; the store allocates the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCharacter {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub name: String,
    pub row: i32,
    pub col: i32,
    pub properties: BTreeMap<String, i64>,
}

/// Durable storage for users, sessions, and characters.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because one instance is shared by every
/// connection task, and every returned future is `Send` so session
/// operations can run on any runtime worker.
///
/// Lookups return `Ok(None)` for absent records; writes that target an
/// absent record return [`StoreError::Missing`].
pub trait Persistence: Send + Sync + 'static {
    /// Looks up a user.
    fn find_user(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    /// Looks up a character.
    fn find_character(
        &self,
        id: CharacterId,
    ) -> impl Future<Output = Result<Option<Character>, StoreError>> + Send;

    /// Looks up a session.
    fn find_session(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<Option<SessionRecord>, StoreError>> + Send;

    /// Writes a new position and returns the updated character.
    fn persist_character_position(
        &self,
        id: CharacterId,
        row: i32,
        col: i32,
    ) -> impl Future<Output = Result<Character, StoreError>> + Send;

    /// Creates a character and returns it with its allocated id.
    fn create_character(
        &self,
        new: NewCharacter,
    ) -> impl Future<Output = Result<Character, StoreError>> + Send;

    /// Deletes a character. Returns `false` if it did not exist.
    fn delete_character(
        &self,
        id: CharacterId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Lists every character a user owns in one session, ordered by id.
    fn characters_of_user_in_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<Character>, StoreError>> + Send;

    /// Sets the session's active flag.
    fn set_session_active(
        &self,
        id: SessionId,
        active: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Stores which character moved last (`None` = nobody yet).
    fn persist_turn_marker(
        &self,
        id: SessionId,
        last_moved: Option<CharacterId>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Lets a caller keep its own handle on a store it hands to the server.
impl<T: Persistence> Persistence for Arc<T> {
    fn find_user(
        &self,
        id: UserId,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send {
        (**self).find_user(id)
    }

    fn find_character(
        &self,
        id: CharacterId,
    ) -> impl Future<Output = Result<Option<Character>, StoreError>> + Send {
        (**self).find_character(id)
    }

    fn find_session(
        &self,
        id: SessionId,
    ) -> impl Future<Output = Result<Option<SessionRecord>, StoreError>> + Send {
        (**self).find_session(id)
    }

    fn persist_character_position(
        &self,
        id: CharacterId,
        row: i32,
        col: i32,
    ) -> impl Future<Output = Result<Character, StoreError>> + Send {
        (**self).persist_character_position(id, row, col)
    }

    fn create_character(
        &self,
        new: NewCharacter,
    ) -> impl Future<Output = Result<Character, StoreError>> + Send {
        (**self).create_character(new)
    }

    fn delete_character(
        &self,
        id: CharacterId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send {
        (**self).delete_character(id)
    }

    fn characters_of_user_in_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> impl Future<Output = Result<Vec<Character>, StoreError>> + Send {
        (**self).characters_of_user_in_session(user_id, session_id)
    }

    fn set_session_active(
        &self,
        id: SessionId,
        active: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).set_session_active(id, active)
    }

    fn persist_turn_marker(
        &self,
        id: SessionId,
        last_moved: Option<CharacterId>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).persist_turn_marker(id, last_moved)
    }
}
