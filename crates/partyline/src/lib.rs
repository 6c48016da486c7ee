//! # Partyline
//!
//! Real-time room coordinator for browser party games.
//!
//! Clients connect over WebSocket, create or join rooms by a short code,
//! and exchange JSON events. The server tracks who is in each room, who
//! hosts it, who is ready, and which round is running, then fans each
//! change out to every member.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use partyline::prelude::*;
//!
//! # async fn start() -> Result<(), PartylineError> {
//! let server = PartylineServer::builder()
//!     .bind("0.0.0.0:3000")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{DEFAULT_HOST, DEFAULT_PORT, ServerConfig};
pub use error::PartylineError;
pub use server::{PartylineServer, PartylineServerBuilder};

/// Convenience re-exports for embedding a server or writing a client.
pub mod prelude {
    pub use crate::{PartylineError, PartylineServer, PartylineServerBuilder, ServerConfig};
    pub use partyline_protocol::{
        ClientEvent, Codec, JsonCodec, MemberView, RoomCode, RoomSnapshot, ServerEvent,
    };
    pub use partyline_room::{RegistryConfig, RegistryHandle};
    pub use partyline_transport::ConnectionId;
}
