//! # Rollplay
//!
//! Real-time session server for turn-based tabletop games played in the
//! browser.
//!
//! Clients connect over WebSocket to `/api/connect/{userId}/{sessionId}`,
//! create and move characters on a tile map, and take turns in a fixed
//! round-robin order by character id. The server keeps the live state in
//! memory and reads and writes durable state through a [`Persistence`]
//! backend and a [`MapService`] you provide (or the bundled in-memory
//! ones).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rollplay::prelude::*;
//!
//! # async fn run() -> Result<(), RollplayError> {
//! let store = MemoryStore::new();
//! store.add_user(UserId(1), "alice").await;
//! store.add_session(MapId(1)).await;
//! let maps = MemoryMaps::new().with_map(MapId(1), GridMap::open(16, 16));
//!
//! let server = RollplayServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(store, maps)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod route;
mod server;

pub use config::ServerConfig;
pub use error::RollplayError;
pub use route::{ConnectTarget, RouteError, parse_connect_path};
pub use server::{RollplayServer, RollplayServerBuilder};

pub use rollplay_protocol::{
    Character, CharacterId, CharacterProperty, ClientMessage, Codec, JsonCodec, MapId,
    ProtocolError, ServerMessage, SessionId, UserId,
};
pub use rollplay_session::{ActiveSession, SessionError, SessionRegistry};
pub use rollplay_store::{
    GridMap, MapService, MemoryMaps, MemoryStore, NewCharacter, ObstacleMap, Persistence,
    SessionRecord, StoreError, User,
};
pub use rollplay_transport::TransportError;
pub use rollplay_turn::{TurnError, TurnTracker};

/// Everything needed to run a server, in one import.
pub mod prelude {
    pub use crate::{
        Character, CharacterId, GridMap, MapId, MapService, MemoryMaps, MemoryStore,
        ObstacleMap, Persistence, RollplayError, RollplayServer, RollplayServerBuilder,
        ServerConfig, ServerMessage, SessionId, SessionRecord, StoreError, User, UserId,
    };
}
