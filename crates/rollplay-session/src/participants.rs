//! Who is connected to a session and which characters they have active.

use std::collections::{BTreeSet, HashMap};

use rollplay_protocol::{CharacterId, UserId};
use rollplay_transport::ConnectionId;

use crate::{ConnectionHandle, SessionError};

/// One user's live presence in a session.
#[derive(Debug, Default)]
struct Participant {
    /// Open connections, in the order they joined.
    connections: Vec<ConnectionHandle>,
    /// Characters this user has active in the session.
    characters: BTreeSet<CharacterId>,
}

/// Per-session table of participants.
///
/// Invariants kept here:
/// - a participant exists iff it has at least one connection, except
///   transiently between [`remove_connection`](Self::remove_connection)
///   returning `true` and the caller calling [`retire`](Self::retire)
/// - a character id is owned by at most one participant
///
/// Not thread-safe by itself; [`ActiveSession`](crate::ActiveSession) keeps
/// it behind the session lock.
#[derive(Debug, Default)]
pub struct ParticipantTable {
    participants: HashMap<UserId, Participant>,
}

impl ParticipantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for its user.
    ///
    /// Returns `true` if this is the user's first connection, i.e. the
    /// participant was just created.
    pub fn add_connection(&mut self, handle: ConnectionHandle) -> bool {
        let participant = self.participants.entry(handle.user_id()).or_default();
        let first = participant.connections.is_empty();
        if !participant.connections.contains(&handle) {
            participant.connections.push(handle);
        }
        first
    }

    /// Unregisters a connection.
    ///
    /// Returns `true` if the user now has no connections left. The
    /// participant (and its characters) stays in the table until
    /// [`retire`](Self::retire) is called, so the caller can deactivate
    /// characters first.
    ///
    /// # Errors
    /// [`SessionError::UserNotConnected`] if the user has no participant.
    pub fn remove_connection(
        &mut self,
        user_id: UserId,
        conn_id: ConnectionId,
    ) -> Result<bool, SessionError> {
        let participant = self
            .participants
            .get_mut(&user_id)
            .ok_or(SessionError::UserNotConnected(user_id))?;
        participant.connections.retain(|h| h.id() != conn_id);
        Ok(participant.connections.is_empty())
    }

    /// Drops a participant entirely, returning whatever characters it
    /// still owned.
    pub fn retire(&mut self, user_id: UserId) -> BTreeSet<CharacterId> {
        self.participants
            .remove(&user_id)
            .map(|p| p.characters)
            .unwrap_or_default()
    }

    pub fn contains_user(&self, user_id: UserId) -> bool {
        self.participants.contains_key(&user_id)
    }

    /// Characters the user has active; empty if the user is absent.
    pub fn owned_characters(&self, user_id: UserId) -> BTreeSet<CharacterId> {
        self.participants
            .get(&user_id)
            .map(|p| p.characters.clone())
            .unwrap_or_default()
    }

    /// Every active character in the session.
    pub fn all_active_character_ids(&self) -> BTreeSet<CharacterId> {
        self.participants
            .values()
            .flat_map(|p| p.characters.iter().copied())
            .collect()
    }

    /// Returns the user that has `character_id` active.
    pub fn owner_of(&self, character_id: CharacterId) -> Option<UserId> {
        self.participants
            .iter()
            .find(|(_, p)| p.characters.contains(&character_id))
            .map(|(user_id, _)| *user_id)
    }

    /// Connections of every user except `user_id`.
    pub fn connections_excluding(
        &self,
        user_id: UserId,
    ) -> impl Iterator<Item = (UserId, &ConnectionHandle)> {
        self.participants
            .iter()
            .filter(move |(id, _)| **id != user_id)
            .flat_map(|(id, p)| p.connections.iter().map(move |h| (*id, h)))
    }

    /// Connections of one user; empty if the user is absent.
    pub fn connections_of(&self, user_id: UserId) -> &[ConnectionHandle] {
        self.participants
            .get(&user_id)
            .map(|p| p.connections.as_slice())
            .unwrap_or_default()
    }

    /// Every open connection in the session.
    pub fn all_connections(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.participants.values().flat_map(|p| p.connections.iter())
    }

    /// Marks `character_id` as active under `user_id`.
    ///
    /// # Errors
    /// - [`SessionError::UserNotConnected`] if the user has no participant
    /// - [`SessionError::AlreadyActive`] if any participant owns it already
    pub fn add_character(
        &mut self,
        user_id: UserId,
        character_id: CharacterId,
    ) -> Result<(), SessionError> {
        if !self.participants.contains_key(&user_id) {
            return Err(SessionError::UserNotConnected(user_id));
        }
        if self.owner_of(character_id).is_some() {
            return Err(SessionError::AlreadyActive(character_id));
        }
        if let Some(participant) = self.participants.get_mut(&user_id) {
            participant.characters.insert(character_id);
        }
        Ok(())
    }

    /// Ends `character_id`'s active membership under `user_id`.
    ///
    /// # Errors
    /// - [`SessionError::UserNotConnected`] if the user has no participant
    /// - [`SessionError::CharacterNotActive`] if the user doesn't own it
    pub fn remove_character(
        &mut self,
        user_id: UserId,
        character_id: CharacterId,
    ) -> Result<(), SessionError> {
        let participant = self
            .participants
            .get_mut(&user_id)
            .ok_or(SessionError::UserNotConnected(user_id))?;
        if participant.characters.remove(&character_id) {
            Ok(())
        } else {
            Err(SessionError::CharacterNotActive(character_id))
        }
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}
