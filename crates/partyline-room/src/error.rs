//! Error types for the room layer.

use partyline_protocol::RoomCode;
use partyline_transport::ConnectionId;

/// Errors that can occur during room operations.
///
/// Most of these never reach a client: the registry drops invalid events
/// silently so non-members learn nothing about a room. See
/// [`RoomRegistry::handle`](crate::RoomRegistry::handle) for which ones are
/// surfaced.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No live room has this code.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The connection is not a member of this room.
    #[error("{0} is not a member of room {1}")]
    NotMember(ConnectionId, RoomCode),

    /// A non-host attempted a host-only action.
    #[error("{0} is not the host of room {1}")]
    NotHost(ConnectionId, RoomCode),

    /// A freshly generated code is already taken.
    ///
    /// Internal only: the registry retries with a new code and never
    /// reports this to a client.
    #[error("room code {0} already in use")]
    DuplicateCode(RoomCode),

    /// Every generation attempt collided with a live room.
    #[error("no free room code after {0} attempts")]
    CodeSpaceExhausted(usize),

    /// The registry task has stopped or its mailbox is closed.
    #[error("room registry is unavailable")]
    Unavailable,
}
