//! Unified error type for Rollplay.

use rollplay_protocol::ProtocolError;
use rollplay_session::SessionError;
use rollplay_store::StoreError;
use rollplay_transport::TransportError;

use crate::RouteError;

/// Top-level error that wraps every crate-specific error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors. All
/// variants are transparent, so the text a client sees in an `error`
/// message is the underlying error's own message.
#[derive(Debug, thiserror::Error)]
pub enum RollplayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Route(#[from] RouteError),

    /// The connection was refused before joining a session.
    #[error("connection refused: {0}")]
    Rejected(&'static str),
}
