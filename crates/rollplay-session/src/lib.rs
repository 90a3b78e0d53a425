//! Live session engine for Rollplay.
//!
//! This crate holds everything that exists only while players are
//! connected:
//!
//! 1. **Connections**: a [`ConnectionHandle`] per open socket, carrying an
//!    outbound message queue
//! 2. **Participants**: who is connected and which characters they have
//!    active ([`ParticipantTable`])
//! 3. **Sessions**: one [`ActiveSession`] per live game, serialising every
//!    turn-affecting operation behind its own lock
//! 4. **Registry**: the process-wide [`SessionRegistry`] that creates a
//!    session on its first connection and retires it on its last
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)  ← dispatches client messages to session operations
//!     ↕
//! Session Layer (this crate)  ← in-memory state, turn checks, broadcasts
//!     ↕
//! Turn / Store / Protocol (below)
//! ```

mod error;
mod handle;
mod participants;
mod registry;
mod session;

pub use error::SessionError;
pub use handle::{ConnectionHandle, OutboundReceiver, outbound_channel};
pub use participants::ParticipantTable;
pub use registry::SessionRegistry;
pub use session::ActiveSession;
