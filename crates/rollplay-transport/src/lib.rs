//! Transport abstraction layer for Rollplay.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the network protocol carrying text frames between clients and the
//! session engine.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{PendingWebSocket, WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Opaque identifier for a connection.
///
/// Two connections opened by the same user get different ids; the id is
/// the connection's identity everywhere above this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why a connection is being closed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// The connection request was refused (1003).
    CannotAccept,
    /// The server hit an unexpected condition (1011).
    InternalError,
}

impl CloseCode {
    /// Returns the numeric WebSocket close code.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::CannotAccept => 1003,
            Self::InternalError => 1011,
        }
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// An accepted connection that has not completed its handshake.
    type Pending: Pending<Connection = Self::Connection, Error = Self::Error>;
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    ///
    /// Only the raw accept happens here. The protocol handshake is left to
    /// [`Pending::upgrade`] so a peer that never finishes it can't hold up
    /// the accept loop.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// An accepted connection waiting for its protocol handshake.
pub trait Pending: Send + 'static {
    /// The connection produced by a successful handshake.
    type Connection: Connection;
    /// The error type for the handshake.
    type Error: std::error::Error + Send + Sync;

    /// Runs the handshake.
    async fn upgrade(self) -> Result<Self::Connection, Self::Error>;
}

/// A single connection that exchanges text frames with the remote peer.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one text frame to the remote peer.
    async fn send_text(&self, text: &str) -> Result<(), Self::Error>;

    /// Receives the next text frame from the remote peer.
    ///
    /// Non-text frames are skipped. Returns `Ok(None)` when the
    /// connection is cleanly closed.
    async fn recv_text(&self) -> Result<Option<String>, Self::Error>;

    /// Closes the connection with the given code and reason.
    async fn close(&self, code: CloseCode, reason: &str)
    -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the request path the client connected to.
    fn path(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_equality() {
        let a = ConnectionId::new(1);
        let b = ConnectionId::new(1);
        let c = ConnectionId::new(2);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_close_code_numeric_values() {
        assert_eq!(CloseCode::CannotAccept.as_u16(), 1003);
        assert_eq!(CloseCode::InternalError.as_u16(), 1011);
    }
}
