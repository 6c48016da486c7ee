//! `PartylineServer` builder and accept loop.
//!
//! This is the entry point for running a Partyline server. It ties the
//! layers together: WebSocket transport, JSON codec, and the room
//! registry actor.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use partyline_protocol::{Codec, JsonCodec};
use partyline_room::{RegistryConfig, RegistryHandle, spawn_registry};
use partyline_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{PartylineError, ServerConfig};

/// Shared server state passed to each connection handler task.
///
/// Room state lives in the registry actor, so nothing here needs a lock.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) registry: RegistryHandle,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Option<Duration>,
}

/// Builder for configuring and starting a Partyline server.
///
/// # Example
///
/// ```rust,no_run
/// use partyline::prelude::*;
///
/// # async fn start() -> Result<(), PartylineError> {
/// let server = PartylineServer::builder()
///     .bind("0.0.0.0:3000")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct PartylineServerBuilder {
    config: ServerConfig,
}

impl PartylineServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(ServerConfig::default())
    }

    /// Creates a builder seeded with an existing configuration.
    pub fn from_config(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Closes connections that send nothing for `timeout`.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// Sets the registry configuration.
    pub fn registry_config(mut self, config: RegistryConfig) -> Self {
        self.config.registry = config;
        self
    }

    /// Binds the listener and starts the registry actor.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    pub async fn build(self) -> Result<PartylineServer<JsonCodec>, PartylineError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let registry = spawn_registry(self.config.registry);

        let state = Arc::new(ServerState {
            registry,
            codec: JsonCodec,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(PartylineServer { transport, state })
    }
}

impl Default for PartylineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Partyline server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting connections.
pub struct PartylineServer<C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl PartylineServer<JsonCodec> {
    /// Creates a new builder.
    pub fn builder() -> PartylineServerBuilder {
        PartylineServerBuilder::new()
    }
}

impl<C: Codec> PartylineServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the room registry, for inspection.
    pub fn registry(&self) -> RegistryHandle {
        self.state.registry.clone()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), PartylineError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes, then stops the
    /// registry.
    ///
    /// Each accepted connection gets its own handler task. A failed
    /// accept (including a failed WebSocket upgrade) is logged and the
    /// loop continues.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), PartylineError> {
        tracing::info!("Partyline server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, no longer accepting");
                    break;
                }
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }

        if let Err(e) = self.state.registry.shutdown().await {
            tracing::debug!(error = %e, "registry already stopped");
        }
        Ok(())
    }
}
