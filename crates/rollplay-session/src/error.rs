//! Error types for the session layer.

use rollplay_protocol::{CharacterId, MapId, SessionId, UserId};
use rollplay_store::StoreError;
use rollplay_turn::TurnError;

/// Errors that can occur while operating on a live session.
///
/// The `Display` text is what the client sees in an `error` message, so
/// keep it readable.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The user has no open connection in this session.
    #[error("user {0} is not connected to this session")]
    UserNotConnected(UserId),

    /// The character exists (maybe) but is not active in this session.
    #[error("character {0} is not active in this session")]
    CharacterNotActive(CharacterId),

    /// No session record with this id.
    #[error("session {0} does not exist")]
    SessionNotFound(SessionId),

    /// The session's map could not be loaded.
    #[error("map {0} does not exist")]
    MapNotFound(MapId),

    /// The character belongs to another user.
    #[error("character {character} does not belong to user {user}")]
    NotOwner { character: CharacterId, user: UserId },

    /// The character belongs to another session.
    #[error("character {character} does not belong to session {session}")]
    WrongSession {
        character: CharacterId,
        session: SessionId,
    },

    /// Move attempted out of turn.
    #[error(transparent)]
    Turn(#[from] TurnError),

    /// The target tile blocks movement.
    #[error("tile ({row}, {col}) is an obstacle")]
    Obstacle { row: i32, col: i32 },

    /// The character is already active.
    #[error("character {0} is already active")]
    AlreadyActive(CharacterId),

    /// A persistence or map collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The session lost its last connection and is being torn down.
    /// [`SessionRegistry::join`](crate::SessionRegistry::join) retries on a
    /// fresh session when it sees this.
    #[error("session {0} is shutting down")]
    Retired(SessionId),
}
