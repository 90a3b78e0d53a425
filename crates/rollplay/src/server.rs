//! `RollplayServer` builder and accept loop.
//!
//! This is the entry point for running a Rollplay server. It ties the
//! layers together: transport → protocol → session → store.

use std::sync::Arc;

use rollplay_protocol::{Codec, JsonCodec};
use rollplay_session::SessionRegistry;
use rollplay_store::{MapService, Persistence};
use rollplay_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{RollplayError, ServerConfig};

/// Shared server state passed to each connection task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The registry
/// does its own locking; the collaborators are shared as-is.
pub(crate) struct ServerState<P: Persistence, M: MapService, C: Codec> {
    pub(crate) registry: SessionRegistry,
    pub(crate) store: P,
    pub(crate) maps: M,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Rollplay server.
///
/// # Example
///
/// ```rust,ignore
/// let server = RollplayServer::builder()
///     .bind("0.0.0.0:8080")
///     .default_character_name("Adventurer")
///     .build(store, maps)
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone, Default)]
pub struct RollplayServerBuilder {
    config: ServerConfig,
}

impl RollplayServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the path prefix clients connect under.
    pub fn route_prefix(mut self, prefix: &str) -> Self {
        self.config.route_prefix = prefix.to_string();
        self
    }

    /// Sets the name given to characters created without one.
    pub fn default_character_name(mut self, name: &str) -> Self {
        self.config.default_character_name = name.to_string();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the listener and builds the server around the given
    /// collaborators.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build<P: Persistence, M: MapService>(
        self,
        store: P,
        maps: M,
    ) -> Result<RollplayServer<P, M, JsonCodec>, RollplayError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: SessionRegistry::new(),
            store,
            maps,
            codec: JsonCodec,
            config: self.config,
        });

        Ok(RollplayServer { transport, state })
    }
}

/// A bound Rollplay server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RollplayServer<P: Persistence, M: MapService, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<P, M, C>>,
}

impl RollplayServer<rollplay_store::MemoryStore, rollplay_store::MemoryMaps, JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> RollplayServerBuilder {
        RollplayServerBuilder::new()
    }
}

impl<P, M, C> RollplayServer<P, M, C>
where
    P: Persistence,
    M: MapService,
    C: Codec,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The configuration the server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Runs the accept loop.
    ///
    /// Spawns one task per accepted connection; the WebSocket handshake
    /// runs in that task, not here. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), RollplayError> {
        tracing::info!(
            addr = %self.state.config.bind_addr,
            prefix = %self.state.config.route_prefix,
            "Rollplay server running"
        );

        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(pending, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
