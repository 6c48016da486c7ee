//! Per-connection handler: greeting, event routing, and cleanup.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register with the registry and receive this connection's outbox
//!   2. Send `connected` so the client learns its id
//!   3. Spawn a writer that drains the outbox onto the socket
//!   4. Loop: receive frames, decode, dispatch to the registry
//!   5. On exit, the guard tells the registry the connection is gone

use std::sync::Arc;

use partyline_protocol::{ClientEvent, Codec, ServerEvent};
use partyline_room::RegistryHandle;
use partyline_transport::{Connection, ConnectionId, Outbox, WebSocketConnection};

use crate::PartylineError;
use crate::server::ServerState;

/// Drop guard that runs disconnect cleanup when the handler exits.
///
/// Cleanup happens even if the handler panics. Since `Drop` is
/// synchronous, a fire-and-forget task delivers the command.
struct DisconnectGuard {
    conn_id: ConnectionId,
    registry: RegistryHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let registry = self.registry.clone();
        tokio::spawn(async move {
            if let Err(e) = registry.disconnect(conn_id).await {
                tracing::debug!(%conn_id, error = %e, "disconnect not delivered");
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), PartylineError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::info!(%conn_id, "connection accepted");

    let outbox = state.registry.connect(conn_id).await?;
    let guard = DisconnectGuard {
        conn_id,
        registry: state.registry.clone(),
    };

    // Nothing can be queued for this connection before it joins a room,
    // so sending the greeting inline keeps it first on the wire.
    let greeting = state.codec.encode(&ServerEvent::Connected {
        connection_id: conn_id,
    })?;
    conn.send(&greeting).await?;

    let writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        outbox,
        Arc::clone(&state),
    ));

    let result = read_loop(&conn, &state).await;

    // Cleanup drops this connection's sender, which ends the writer.
    drop(guard);
    if let Err(e) = writer.await {
        tracing::debug!(%conn_id, error = %e, "writer task failed");
    }
    if let Err(e) = conn.close().await {
        tracing::debug!(%conn_id, error = %e, "close failed");
    }

    tracing::info!(%conn_id, "connection closed");
    result
}

/// Receives frames until the peer goes away or goes quiet.
async fn read_loop<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
) -> Result<(), PartylineError> {
    let conn_id = conn.id();

    loop {
        let received = match state.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, conn.recv()).await {
                Ok(received) => received,
                Err(_) => {
                    tracing::info!(%conn_id, "connection idle, closing");
                    return Ok(());
                }
            },
            None => conn.recv().await,
        };

        let data = match received {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%conn_id, "peer closed connection");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return Ok(());
            }
        };

        let event: ClientEvent = match state.codec.decode(&data) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "ignoring undecodable frame");
                continue;
            }
        };

        tracing::trace!(%conn_id, event = event.name(), "event received");
        state.registry.dispatch(conn_id, event).await?;
    }
}

/// Drains the connection's outbox onto the socket, in order.
///
/// Stops when the registry drops the sending side or the socket fails.
async fn write_loop<C: Codec>(
    conn: Arc<WebSocketConnection>,
    mut outbox: Outbox<ServerEvent>,
    state: Arc<ServerState<C>>,
) {
    let conn_id = conn.id();

    while let Some(event) = outbox.recv().await {
        let bytes = match state.codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(%conn_id, error = %e, "failed to encode event");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(%conn_id, error = %e, "send failed, stopping writer");
            break;
        }
    }
}
