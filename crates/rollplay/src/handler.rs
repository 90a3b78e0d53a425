//! Per-connection handler: routing, admission, and message dispatch.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   0. Finish the WebSocket handshake
//!   1. Parse `{prefix}/{userId}/{sessionId}` from the request path
//!   2. Check both ids exist in the store, else close with a reason
//!   3. Join the session (creating it if this is its first connection)
//!   4. Loop: decode client frames → session operations, and write out
//!      whatever the session queued for this connection
//!   5. Leave the session, whatever ended the loop

use std::collections::BTreeMap;
use std::sync::Arc;

use rollplay_protocol::{ClientMessage, Codec, ServerMessage, UserId, properties_to_map};
use rollplay_session::{ActiveSession, ConnectionHandle, OutboundReceiver, outbound_channel};
use rollplay_store::{MapService, NewCharacter, Persistence};
use rollplay_transport::{CloseCode, Connection, Pending, PendingWebSocket, WebSocketConnection};

use crate::RollplayError;
use crate::route::parse_connect_path;
use crate::server::ServerState;

const UNKNOWN_USER: &str = "Invalid userId: user does not exist";
const UNKNOWN_SESSION: &str = "Invalid sessionId: session does not exist";

/// Drop guard that removes the connection from its session when the
/// handler exits.
///
/// The normal exit path calls [`release`](Self::release) so the leave
/// completes before the task ends. If the handler unwinds or is cancelled
/// instead, `Drop` spawns the leave as a fire-and-forget task. Either way
/// it runs exactly once.
struct LeaveGuard<P: Persistence, M: MapService, C: Codec> {
    state: Arc<ServerState<P, M, C>>,
    session: Arc<ActiveSession>,
    handle: Option<ConnectionHandle>,
}

impl<P: Persistence, M: MapService, C: Codec> LeaveGuard<P, M, C> {
    async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            leave(&self.state, &self.session, &handle).await;
        }
    }
}

impl<P: Persistence, M: MapService, C: Codec> Drop for LeaveGuard<P, M, C> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let state = Arc::clone(&self.state);
        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    leave(&state, &session, &handle).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    conn_id = %handle.id(),
                    session_id = %session.id(),
                    "no runtime to run leave on"
                );
            }
        }
    }
}

async fn leave<P: Persistence, M: MapService, C: Codec>(
    state: &ServerState<P, M, C>,
    session: &Arc<ActiveSession>,
    handle: &ConnectionHandle,
) {
    // Failures are logged by the registry.
    let _ = state.registry.leave(&state.store, session, handle).await;
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<P, M, C>(
    pending: PendingWebSocket,
    state: Arc<ServerState<P, M, C>>,
) -> Result<(), RollplayError>
where
    P: Persistence,
    M: MapService,
    C: Codec,
{
    let peer = pending.peer_addr();
    let conn = match pending.upgrade().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::debug!(%peer, error = %e, "WebSocket handshake failed");
            return Err(e.into());
        }
    };
    let conn_id = conn.id();
    tracing::debug!(%conn_id, path = conn.path(), "handling new connection");

    // --- Step 1: Admission ---
    let target = match parse_connect_path(&state.config.route_prefix, conn.path()) {
        Ok(target) => target,
        Err(e) => {
            refuse(&conn, CloseCode::CannotAccept, &e.to_string()).await;
            return Err(e.into());
        }
    };
    let user_id = target.user_id;
    let session_id = target.session_id;

    match state.store.find_user(user_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            refuse(&conn, CloseCode::CannotAccept, UNKNOWN_USER).await;
            return Err(RollplayError::Rejected(UNKNOWN_USER));
        }
        Err(e) => {
            refuse(&conn, CloseCode::InternalError, &e.to_string()).await;
            return Err(e.into());
        }
    }
    match state.store.find_session(session_id).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            refuse(&conn, CloseCode::CannotAccept, UNKNOWN_SESSION).await;
            return Err(RollplayError::Rejected(UNKNOWN_SESSION));
        }
        Err(e) => {
            refuse(&conn, CloseCode::InternalError, &e.to_string()).await;
            return Err(e.into());
        }
    }

    // --- Step 2: Join ---
    let (tx, mut rx) = outbound_channel();
    let handle = ConnectionHandle::new(conn_id, user_id, tx);
    let session = match state
        .registry
        .join(&state.store, session_id, handle.clone())
        .await
    {
        Ok(session) => session,
        Err(e) => {
            refuse(&conn, CloseCode::InternalError, &e.to_string()).await;
            return Err(e.into());
        }
    };
    tracing::info!(%conn_id, %user_id, %session_id, "connection joined session");

    let guard = LeaveGuard {
        state: Arc::clone(&state),
        session: Arc::clone(&session),
        handle: Some(handle.clone()),
    };

    // --- Step 3: Message loop ---
    let result = message_loop(&conn, &state, &session, &handle, &mut rx).await;

    guard.release().await;
    result
}

/// Pumps frames both ways until the client goes away.
async fn message_loop<P, M, C>(
    conn: &WebSocketConnection,
    state: &ServerState<P, M, C>,
    session: &ActiveSession,
    handle: &ConnectionHandle,
    rx: &mut OutboundReceiver,
) -> Result<(), RollplayError>
where
    P: Persistence,
    M: MapService,
    C: Codec,
{
    let conn_id = conn.id();
    let user_id = handle.user_id();

    loop {
        tokio::select! {
            frame = conn.recv_text() => match frame {
                Ok(Some(text)) => {
                    if let Err(e) = dispatch(state, session, user_id, &text).await {
                        tracing::warn!(%conn_id, %user_id, error = %e, "request failed");
                        handle.send(ServerMessage::Error {
                            message: e.to_string(),
                        });
                    }
                }
                Ok(None) => {
                    tracing::info!(%conn_id, %user_id, "connection closed cleanly");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(%conn_id, %user_id, error = %e, "recv error");
                    return Err(e.into());
                }
            },
            Some(msg) = rx.recv() => {
                let text = state.codec.encode(&msg)?;
                conn.send_text(&text).await?;
            }
        }
    }
}

/// Applies one client frame to the session.
async fn dispatch<P, M, C>(
    state: &ServerState<P, M, C>,
    session: &ActiveSession,
    user_id: UserId,
    text: &str,
) -> Result<(), RollplayError>
where
    P: Persistence,
    M: MapService,
    C: Codec,
{
    let msg: ClientMessage = state.codec.decode(text)?;
    match msg {
        ClientMessage::NewCharacter {
            name,
            row,
            col,
            properties,
        } => {
            let new = NewCharacter {
                user_id,
                session_id: session.id(),
                name: name.unwrap_or_else(|| state.config.default_character_name.clone()),
                row: row.unwrap_or(0),
                col: col.unwrap_or(0),
                properties: properties.map(properties_to_map).unwrap_or_else(BTreeMap::new),
            };
            session.create_character(&state.store, new).await?;
        }
        ClientMessage::RemoveCharacter { id } => {
            session.delete_character(&state.store, user_id, id).await?;
        }
        ClientMessage::MoveCharacter { id, row, col } => {
            session
                .move_character(&state.store, &state.maps, user_id, id, row, col)
                .await?;
        }
    }
    Ok(())
}

/// Closes a connection that won't join a session.
async fn refuse(conn: &WebSocketConnection, code: CloseCode, reason: &str) {
    tracing::info!(conn_id = %conn.id(), path = conn.path(), reason, "refusing connection");
    if let Err(e) = conn.close(code, reason).await {
        tracing::debug!(conn_id = %conn.id(), error = %e, "close failed");
    }
}
