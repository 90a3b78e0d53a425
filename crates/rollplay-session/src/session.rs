//! One running game session.
//!
//! Every operation that can change who holds the turn runs under the
//! session's own lock, including the persistence calls it makes, so two
//! moves on the same session are always evaluated one after another.
//! Outbound messages are queued inside the same critical section, which
//! keeps every connection's view in commit order. Different sessions never
//! contend with each other.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use rollplay_protocol::{Character, CharacterId, MapId, ServerMessage, SessionId, UserId};
use rollplay_store::{MapService, NewCharacter, ObstacleMap, Persistence, SessionRecord};
use rollplay_turn::TurnTracker;
use tokio::sync::Mutex;

use crate::{ConnectionHandle, ParticipantTable, SessionError};

/// State guarded by the session lock.
#[derive(Debug)]
struct SessionInner {
    turn: TurnTracker,
    participants: ParticipantTable,
    /// Latest known snapshot of every active character.
    roster: HashMap<CharacterId, Character>,
}

impl SessionInner {
    fn active_ids(&self) -> BTreeSet<CharacterId> {
        self.participants.all_active_character_ids()
    }

    fn current_turn(&self) -> Option<CharacterId> {
        self.turn.current_turn(&self.active_ids())
    }

    fn broadcast(&self, msg: &ServerMessage) {
        for handle in self.participants.all_connections() {
            handle.send(msg.clone());
        }
    }

    fn send_to_user(&self, user_id: UserId, msg: &ServerMessage) {
        for handle in self.participants.connections_of(user_id) {
            handle.send(msg.clone());
        }
    }

    /// Turn status only goes to the character's owner.
    fn send_status(&self, id: CharacterId, can_move: bool) {
        if let Some(owner) = self.participants.owner_of(id) {
            self.send_to_user(owner, &ServerMessage::CharacterStatus { id, can_move });
        }
    }

    fn validate_ownership(
        &self,
        session_id: SessionId,
        character_id: CharacterId,
        user_id: UserId,
    ) -> Result<&Character, SessionError> {
        let character = self
            .roster
            .get(&character_id)
            .ok_or(SessionError::CharacterNotActive(character_id))?;
        if character.user_id != user_id {
            return Err(SessionError::NotOwner {
                character: character_id,
                user: user_id,
            });
        }
        if character.session_id != session_id {
            return Err(SessionError::WrongSession {
                character: character_id,
                session: session_id,
            });
        }
        Ok(character)
    }

    fn activate(
        &mut self,
        session_id: SessionId,
        character: Character,
    ) -> Result<(), SessionError> {
        if character.session_id != session_id {
            return Err(SessionError::WrongSession {
                character: character.id,
                session: session_id,
            });
        }
        let owner = character.user_id;
        let id = character.id;
        let before = self.current_turn();
        self.participants.add_character(owner, id)?;
        self.roster.insert(id, character.clone());

        let mine = ServerMessage::CharacterNew {
            character: character.clone(),
            own: true,
        };
        let theirs = ServerMessage::CharacterNew {
            character,
            own: false,
        };
        self.send_to_user(owner, &mine);
        for (_, handle) in self.participants.connections_excluding(owner) {
            handle.send(theirs.clone());
        }

        let after = self.current_turn();
        tracing::info!(%session_id, %id, user_id = %owner, "character activated");
        if before != after {
            if let Some(previous) = before {
                self.send_status(previous, false);
            }
            if let Some(next) = after {
                tracing::info!(%session_id, holder = %next, "turn passed");
                self.send_status(next, true);
            }
        }
        Ok(())
    }

    fn deactivate(
        &mut self,
        session_id: SessionId,
        user_id: UserId,
        id: CharacterId,
    ) -> Result<(), SessionError> {
        let holder = self.current_turn();
        self.participants.remove_character(user_id, id)?;
        self.roster.remove(&id);
        self.broadcast(&ServerMessage::CharacterLeave { id });
        tracing::info!(%session_id, %id, %user_id, "character deactivated");

        if holder == Some(id) {
            if let Some(next) = self.current_turn() {
                tracing::info!(%session_id, holder = %next, "turn passed");
                self.send_status(next, true);
            }
        }
        Ok(())
    }
}

/// A live game session.
///
/// Created by [`SessionRegistry`](crate::SessionRegistry) when the first
/// connection for a session id arrives and retired when the last one
/// leaves. Once retired a session refuses every operation with
/// [`SessionError::Retired`]; the registry replaces it on the next join.
#[derive(Debug)]
pub struct ActiveSession {
    id: SessionId,
    map_id: MapId,
    started_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
    retired: AtomicBool,
}

impl ActiveSession {
    /// Builds the live state from a persisted record, restoring the turn
    /// marker.
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: record.id,
            map_id: record.map_id,
            started_at: record.started_at,
            inner: Mutex::new(SessionInner {
                turn: TurnTracker::new(record.last_moved),
                participants: ParticipantTable::new(),
                roster: HashMap::new(),
            }),
            retired: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// `true` once the last connection has left.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Waits until any in-flight operation, including a retiring flush,
    /// has finished.
    pub(crate) async fn settle(&self) {
        drop(self.inner.lock().await);
    }

    /// The character currently allowed to move.
    pub async fn turn_holder(&self) -> Option<CharacterId> {
        self.inner.lock().await.current_turn()
    }

    pub async fn last_moved(&self) -> Option<CharacterId> {
        self.inner.lock().await.turn.last_moved()
    }

    /// Snapshots of the active characters, ordered by id.
    pub async fn active_characters(&self) -> Vec<Character> {
        let inner = self.inner.lock().await;
        let mut characters: Vec<_> = inner.roster.values().cloned().collect();
        characters.sort_by_key(|c| c.id);
        characters
    }

    pub async fn participant_count(&self) -> usize {
        self.inner.lock().await.participants.len()
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        if self.is_retired() {
            Err(SessionError::Retired(self.id))
        } else {
            Ok(())
        }
    }

    /// Adds a connection to the session.
    ///
    /// The new connection gets a `session:info` greeting and a
    /// `character:new` for every active character. On the user's first
    /// connection their persisted characters in this session are
    /// activated; on a repeat connection the turn status is resent to the
    /// new connection if the user holds the turn.
    ///
    /// # Errors
    /// [`SessionError::Retired`] before anything is registered. A store
    /// failure while restoring characters leaves the connection registered;
    /// the caller must [`leave`](Self::leave) to undo it.
    pub async fn join<P: Persistence>(
        &self,
        store: &P,
        handle: ConnectionHandle,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        self.ensure_live()?;

        let user_id = handle.user_id();
        let first = inner.participants.add_connection(handle.clone());
        tracing::info!(
            session_id = %self.id,
            %user_id,
            conn_id = %handle.id(),
            first,
            "participant joined"
        );

        handle.send(ServerMessage::SessionInfo {
            session_id: self.id,
            map_id: self.map_id,
            started: self.started_at,
        });
        let mut active: Vec<_> = inner.roster.values().collect();
        active.sort_by_key(|c| c.id);
        for character in active {
            handle.send(ServerMessage::CharacterNew {
                character: character.clone(),
                own: character.user_id == user_id,
            });
        }

        if first {
            let persisted = store
                .characters_of_user_in_session(user_id, self.id)
                .await?;
            for character in persisted {
                let id = character.id;
                if let Err(e) = inner.activate(self.id, character) {
                    tracing::warn!(session_id = %self.id, %id, error = %e, "could not restore character");
                }
            }
        } else if let Some(holder) = inner.current_turn() {
            if inner.participants.owner_of(holder) == Some(user_id) {
                handle.send(ServerMessage::CharacterStatus {
                    id: holder,
                    can_move: true,
                });
            }
        }
        Ok(())
    }

    /// Removes a connection.
    ///
    /// When it was the user's last connection, every character the user
    /// had active is deactivated and the participant is dropped. When it
    /// was the session's last participant, the session is marked retired
    /// and its turn marker and inactive flag are flushed to the store.
    ///
    /// Returns `true` if the session retired.
    pub async fn leave<P: Persistence>(
        &self,
        store: &P,
        handle: &ConnectionHandle,
    ) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock().await;
        let user_id = handle.user_id();
        let now_empty = inner.participants.remove_connection(user_id, handle.id())?;
        tracing::info!(
            session_id = %self.id,
            %user_id,
            conn_id = %handle.id(),
            "connection left"
        );

        if now_empty {
            let owned = inner.participants.owned_characters(user_id);
            for id in owned {
                inner.deactivate(self.id, user_id, id)?;
            }
            inner.participants.retire(user_id);
            tracing::info!(session_id = %self.id, %user_id, "participant left");
        }

        if !inner.participants.is_empty() {
            return Ok(false);
        }

        self.retired.store(true, Ordering::Release);
        let last_moved = inner.turn.last_moved();
        // Both writes are attempted even if the first one fails.
        let marker = store.persist_turn_marker(self.id, last_moved).await;
        let inactive = store.set_session_active(self.id, false).await;
        tracing::info!(session_id = %self.id, "session retired");
        marker?;
        inactive?;
        Ok(true)
    }

    /// Activates an already persisted character.
    ///
    /// The owner's connections see `own=true`, everyone else `own=false`.
    /// If the turn holder changes as a result, the previous holder's owner
    /// gets `can_move=false` and the new holder's owner `can_move=true`.
    pub async fn add_character(&self, character: Character) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        self.ensure_live()?;
        inner.activate(self.id, character)
    }

    /// Creates a character in the store and activates it.
    pub async fn create_character<P: Persistence>(
        &self,
        store: &P,
        new: NewCharacter,
    ) -> Result<Character, SessionError> {
        let mut inner = self.inner.lock().await;
        self.ensure_live()?;
        if !inner.participants.contains_user(new.user_id) {
            return Err(SessionError::UserNotConnected(new.user_id));
        }
        let new = NewCharacter {
            session_id: self.id,
            ..new
        };
        let character = store.create_character(new).await?;
        inner.activate(self.id, character.clone())?;
        Ok(character)
    }

    /// Deactivates a character. It stays in the store.
    pub async fn remove_character(
        &self,
        user_id: UserId,
        id: CharacterId,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        self.ensure_live()?;
        inner.validate_ownership(self.id, id, user_id)?;
        inner.deactivate(self.id, user_id, id)
    }

    /// Deletes a character from the store, then deactivates it.
    pub async fn delete_character<P: Persistence>(
        &self,
        store: &P,
        user_id: UserId,
        id: CharacterId,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        self.ensure_live()?;
        inner.validate_ownership(self.id, id, user_id)?;
        store.delete_character(id).await?;
        inner.deactivate(self.id, user_id, id)
    }

    /// Moves a character.
    ///
    /// Checks run in order: ownership, obstacle, turn. Nothing is
    /// persisted unless all pass. On success the move is broadcast to
    /// every connection, followed by `can_move=false` for the mover and
    /// `can_move=true` for the next holder.
    pub async fn move_character<P: Persistence, M: MapService>(
        &self,
        store: &P,
        maps: &M,
        user_id: UserId,
        id: CharacterId,
        row: i32,
        col: i32,
    ) -> Result<Character, SessionError> {
        let mut inner = self.inner.lock().await;
        self.ensure_live()?;
        inner.validate_ownership(self.id, id, user_id)?;

        let map = maps
            .load_map(self.map_id)
            .await?
            .ok_or(SessionError::MapNotFound(self.map_id))?;
        if map.is_obstacle_tile(row, col) {
            return Err(SessionError::Obstacle { row, col });
        }

        let mut turn = inner.turn;
        turn.record_move(id, &inner.active_ids())?;

        let moved = store.persist_character_position(id, row, col).await?;
        inner.turn = turn;
        inner.roster.insert(id, moved.clone());
        tracing::info!(session_id = %self.id, %id, row, col, "character moved");

        inner.broadcast(&ServerMessage::CharacterMove {
            character: moved.clone(),
        });
        inner.send_status(id, false);
        if let Some(next) = inner.current_turn() {
            tracing::info!(session_id = %self.id, holder = %next, "turn passed");
            inner.send_status(next, true);
        }
        Ok(moved)
    }

    /// Returns the active character if `user_id` owns it and it belongs to
    /// this session.
    pub async fn validate_ownership(
        &self,
        id: CharacterId,
        user_id: UserId,
    ) -> Result<Character, SessionError> {
        let inner = self.inner.lock().await;
        inner.validate_ownership(self.id, id, user_id).cloned()
    }
}
