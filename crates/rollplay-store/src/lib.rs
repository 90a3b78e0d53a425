//! Collaborator contracts for Rollplay.
//!
//! The session engine does not own durable state. It talks to two
//! collaborators through narrow traits:
//!
//! - [`Persistence`]: users, sessions, and characters
//! - [`MapService`]: loads a session's tile map as an [`ObstacleMap`]
//!
//! In-memory implementations ([`MemoryStore`], [`MemoryMaps`]) are
//! provided so the server runs and is testable without external services.
//!
//! ```text
//! Session engine (above)  ← calls the traits, decides when to persist
//!     ↕
//! Store layer (this crate)  ← contracts + in-memory backends
//! ```

#![allow(async_fn_in_trait)]

mod error;
mod map;
mod memory;
mod persistence;

pub use error::StoreError;
pub use map::{GridMap, MapService, MemoryMaps, ObstacleMap};
pub use memory::MemoryStore;
pub use persistence::{NewCharacter, Persistence, SessionRecord, User};
