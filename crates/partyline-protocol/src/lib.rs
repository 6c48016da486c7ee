//! Wire protocol for Partyline.
//!
//! - **Types** ([`ClientEvent`], [`ServerEvent`], [`RoomSnapshot`],
//!   [`RoomCode`]): the events that travel over a connection.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those events are
//!   turned into frames and back.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (frames) → Protocol (ClientEvent) → Room registry
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{ClientEvent, MemberView, RoomCode, RoomSnapshot, ServerEvent};
