//! Room lifecycle and membership for Partyline.
//!
//! All room state lives in one [`RoomRegistry`], driven by one actor task
//! ([`spawn_registry`]). Rooms are created by `createRoom`, mutated by
//! their members' events, and destroyed the instant the last member
//! leaves or disconnects.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: the state machine; sole mutator of room state
//! - [`Room`] / [`Member`]: one room and one member's presence record
//! - [`EventGateway`]: per-connection outboxes and room broadcast groups
//! - [`RegistryHandle`]: send commands to the running registry actor
//! - [`CodeGenerator`]: source of room codes (random by default)

mod actor;
mod code;
mod config;
mod error;
mod registry;
mod room;

pub use actor::{RegistryHandle, spawn_registry, spawn_registry_with};
pub use code::{CODE_ALPHABET, CODE_LEN, CodeGenerator, RandomCodes, is_well_formed};
pub use config::RegistryConfig;
pub use error::RoomError;
pub use registry::{EventGateway, NO_FREE_CODE, ROOM_NOT_FOUND, RoomRegistry};
pub use room::{Member, Room};
