//! Core protocol types for Rollplay's wire format.
//!
//! Every inbound and outbound message is a single JSON object whose
//! `type` field names the event, e.g. `{"type":"character:move", ...}`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a user (a player account).
///
/// `#[serde(transparent)]` keeps it a plain number on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// A unique identifier for a persisted game session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// A unique identifier for a character.
///
/// Ids are allocated by the persistence layer and are totally ordered;
/// the turn order is the id order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CharacterId(pub u64);

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// A unique identifier for a tile map.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MapId(pub u64);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Character
// ---------------------------------------------------------------------------

/// A character as stored by the persistence layer and shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: CharacterId,
    pub user_id: UserId,
    pub session_id: SessionId,
    pub name: String,
    pub row: i32,
    pub col: i32,
    #[serde(default)]
    pub properties: BTreeMap<String, i64>,
}

/// One `{name, value}` entry of the `properties` array in `character:new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterProperty {
    pub name: String,
    pub value: i64,
}

/// Collapses a property list into a name → value map. Later entries win.
pub fn properties_to_map(
    properties: Vec<CharacterProperty>,
) -> BTreeMap<String, i64> {
    properties.into_iter().map(|p| (p.name, p.value)).collect()
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Messages a client sends over its session connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Create a character owned by the sender and make it active.
    /// Every field is optional; the server fills in defaults.
    #[serde(rename = "character:new")]
    NewCharacter {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        row: Option<i32>,
        #[serde(default)]
        col: Option<i32>,
        #[serde(default)]
        properties: Option<Vec<CharacterProperty>>,
    },

    /// Deactivate and delete one of the sender's characters.
    #[serde(rename = "character:remove")]
    RemoveCharacter { id: CharacterId },

    /// Move one of the sender's characters.
    #[serde(rename = "character:move")]
    MoveCharacter { id: CharacterId, row: i32, col: i32 },
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Messages the server pushes to connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// First frame on every joined connection.
    #[serde(rename = "session:info", rename_all = "camelCase")]
    SessionInfo {
        session_id: SessionId,
        map_id: MapId,
        started: DateTime<Utc>,
    },

    /// A character became active. `own` is true only on the owner's
    /// connections.
    #[serde(rename = "character:new")]
    CharacterNew {
        #[serde(flatten)]
        character: Character,
        own: bool,
    },

    /// A character was deactivated.
    #[serde(rename = "character:leave")]
    CharacterLeave { id: CharacterId },

    /// A character's position changed.
    #[serde(rename = "character:move")]
    CharacterMove {
        #[serde(flatten)]
        character: Character,
    },

    /// Turn-holder transition for one character.
    #[serde(rename = "character:status")]
    CharacterStatus { id: CharacterId, can_move: bool },

    /// A request from this connection failed.
    #[serde(rename = "error")]
    Error { message: String },
}

// =========================================================================
// Tests
// =========================================================================
