//! Registry actor: one Tokio task that owns the [`RoomRegistry`].
//!
//! Connection handlers never touch room state. They send commands through
//! a [`RegistryHandle`]; the actor applies them one at a time, in arrival
//! order, which is what keeps membership consistent across concurrent
//! joins, leaves and disconnects.

use partyline_protocol::{ClientEvent, RoomCode, RoomSnapshot, ServerEvent};
use partyline_transport::{ConnectionId, Outbox};
use tokio::sync::{mpsc, oneshot};

use crate::{EventGateway, RegistryConfig, RoomError, RoomRegistry};

/// Commands sent to the registry actor through its mailbox.
pub(crate) enum RegistryCommand {
    /// Register a new connection and hand back its outbox.
    Connect {
        conn: ConnectionId,
        reply: oneshot::Sender<Outbox<ServerEvent>>,
    },

    /// A decoded client event.
    Event {
        from: ConnectionId,
        event: ClientEvent,
    },

    /// The connection is gone; clean up every room it was in.
    Disconnect { conn: ConnectionId },

    /// Read a room's current state.
    Snapshot {
        room: RoomCode,
        reply: oneshot::Sender<Option<RoomSnapshot>>,
    },

    /// Count open rooms.
    RoomCount { reply: oneshot::Sender<usize> },

    /// Stop the actor.
    Shutdown,
}

/// Handle to the running registry actor.
///
/// Cheap to clone; every connection handler holds one.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Registers a connection and returns the outbox its writer drains.
    pub async fn connect(
        &self,
        conn: ConnectionId,
    ) -> Result<Outbox<ServerEvent>, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::Connect {
            conn,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| RoomError::Unavailable)
    }

    /// Queues a client event (fire-and-forget).
    pub async fn dispatch(
        &self,
        from: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), RoomError> {
        self.send(RegistryCommand::Event { from, event }).await
    }

    /// Queues disconnect cleanup for a connection.
    pub async fn disconnect(&self, conn: ConnectionId) -> Result<(), RoomError> {
        self.send(RegistryCommand::Disconnect { conn }).await
    }

    /// Returns a room's current snapshot, or `None` if it is not open.
    pub async fn snapshot(
        &self,
        room: RoomCode,
    ) -> Result<Option<RoomSnapshot>, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::Snapshot {
            room,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| RoomError::Unavailable)
    }

    /// Returns the number of open rooms.
    pub async fn room_count(&self) -> Result<usize, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::RoomCount { reply: reply_tx })
            .await?;
        reply_rx.await.map_err(|_| RoomError::Unavailable)
    }

    /// Tells the actor to stop.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.send(RegistryCommand::Shutdown).await
    }

    async fn send(&self, cmd: RegistryCommand) -> Result<(), RoomError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable)
    }
}

struct RegistryActor {
    registry: RoomRegistry,
    receiver: mpsc::Receiver<RegistryCommand>,
}

impl RegistryActor {
    /// Runs the actor loop, processing commands until shutdown.
    async fn run(mut self) {
        tracing::info!("room registry started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RegistryCommand::Connect { conn, reply } => {
                    let outbox = self.registry.gateway_mut().connect(conn);
                    let _ = reply.send(outbox);
                }
                RegistryCommand::Event { from, event } => {
                    self.registry.handle(from, event);
                }
                RegistryCommand::Disconnect { conn } => {
                    self.registry.disconnect(conn);
                }
                RegistryCommand::Snapshot { room, reply } => {
                    let _ = reply.send(self.registry.room(&room).map(|r| r.snapshot()));
                }
                RegistryCommand::RoomCount { reply } => {
                    let _ = reply.send(self.registry.room_count());
                }
                RegistryCommand::Shutdown => {
                    tracing::info!(rooms = self.registry.room_count(), "room registry shutting down");
                    break;
                }
            }
        }

        tracing::info!("room registry stopped");
    }
}

/// Spawns a registry with random room codes and outboxes sized by
/// `config.outbox_capacity`.
pub fn spawn_registry(config: RegistryConfig) -> RegistryHandle {
    let mailbox_size = config.mailbox_size;
    let gateway = EventGateway::with_capacity(config.outbox_capacity);
    let registry = RoomRegistry::with_config(gateway, config);
    spawn_registry_with(registry, mailbox_size)
}

/// Spawns an actor around a pre-built registry.
///
/// `mailbox_size` controls backpressure: when the mailbox fills up,
/// senders wait.
pub fn spawn_registry_with(
    registry: RoomRegistry,
    mailbox_size: usize,
) -> RegistryHandle {
    let (tx, rx) = mpsc::channel(mailbox_size.max(1));
    let actor = RegistryActor {
        registry,
        receiver: rx,
    };
    tokio::spawn(actor.run());
    RegistryHandle { sender: tx }
}
