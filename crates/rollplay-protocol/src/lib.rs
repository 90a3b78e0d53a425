//! Wire protocol for Rollplay.
//!
//! This crate defines the "language" that clients and the session engine
//! speak:
//!
//! - **Identifiers** ([`UserId`], [`SessionId`], [`CharacterId`], [`MapId`])
//! - **Character**: the full character record as it travels on the wire
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]): one JSON object
//!   per text frame, tagged by `type`
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): text encoding/decoding
//! - **Errors** ([`ProtocolError`])
//!
//! ```text
//! Transport (text frames) → Protocol (messages) → Session (turn/visibility)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Character, CharacterId, CharacterProperty, ClientMessage, MapId,
    ServerMessage, SessionId, UserId, properties_to_map,
};
