//! Outbound side of one client connection.

use std::hash::{Hash, Hasher};

use rollplay_protocol::{ServerMessage, UserId};
use rollplay_transport::ConnectionId;
use tokio::sync::mpsc;

/// Receiving end of a connection's outbound queue, drained by the
/// connection task.
pub type OutboundReceiver = mpsc::UnboundedReceiver<ServerMessage>;

/// Creates the queue that backs a [`ConnectionHandle`].
pub fn outbound_channel() -> (mpsc::UnboundedSender<ServerMessage>, OutboundReceiver) {
    mpsc::unbounded_channel()
}

/// One open connection, bound to the user that opened it.
///
/// Sending never waits on the network: messages go into an unbounded queue
/// that the connection's own task writes out. A slow or dead peer only
/// backs up its own queue.
///
/// Equality and hashing use the connection id only, so one user can hold
/// several handles at once.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        user_id: UserId,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            id,
            user_id,
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Queues a message for this connection.
    ///
    /// Returns `false` if the connection task is gone. The failure is
    /// logged and otherwise ignored so a broadcast can carry on.
    pub fn send(&self, msg: ServerMessage) -> bool {
        match self.sender.send(msg) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    conn_id = %self.id,
                    user_id = %self.user_id,
                    "outbound queue closed, dropping message"
                );
                false
            }
        }
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl Hash for ConnectionHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use rollplay_protocol::CharacterId;

    use super::*;

    #[test]
    fn test_eq_compares_connection_id_only() {
        let (tx, _rx) = outbound_channel();
        let a = ConnectionHandle::new(ConnectionId::new(1), UserId(1), tx.clone());
        let b = ConnectionHandle::new(ConnectionId::new(2), UserId(1), tx.clone());
        let a_again = ConnectionHandle::new(ConnectionId::new(1), UserId(9), tx);

        assert_ne!(a, b);
        assert_eq!(a, a_again);
    }

    #[test]
    fn test_send_delivers_to_receiver() {
        let (tx, mut rx) = outbound_channel();
        let handle = ConnectionHandle::new(ConnectionId::new(1), UserId(1), tx);
        let msg = ServerMessage::CharacterLeave { id: CharacterId(3) };

        assert!(handle.send(msg.clone()));
        assert_eq!(rx.try_recv().unwrap(), msg);
    }

    #[test]
    fn test_send_after_receiver_dropped_returns_false() {
        let (tx, rx) = outbound_channel();
        let handle = ConnectionHandle::new(ConnectionId::new(1), UserId(1), tx);
        drop(rx);

        assert!(!handle.send(ServerMessage::CharacterLeave { id: CharacterId(3) }));
    }
}
