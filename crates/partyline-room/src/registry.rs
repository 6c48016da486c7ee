//! The room registry: sole owner and mutator of all room state.
//!
//! Every client event for every room passes through [`RoomRegistry::handle`]
//! on one task, so operations are serialized and need no locks. Each
//! operation validates, mutates, then tells the [`EventGateway`] what to
//! send.
//!
//! Membership is tracked twice and kept in step:
//!
//! - `Room::members`: the logical fact, broadcast in snapshots.
//! - the gateway group: which connections a room broadcast reaches.
//!
//! Both change within the same operation, before anything is broadcast,
//! so no broadcast ever reaches a connection that has left or misses one
//! that has joined.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexSet;
use partyline_protocol::{ClientEvent, RoomCode, ServerEvent};
use partyline_transport::{ConnectionGateway, ConnectionId};
use serde_json::Value;

use crate::code::{CodeGenerator, RandomCodes};
use crate::room::Departure;
use crate::{RegistryConfig, Room, RoomError};

/// The gateway the registry delivers through: room codes as groups,
/// server events as messages.
pub type EventGateway = ConnectionGateway<RoomCode, ServerEvent>;

/// Sent to a caller whose `joinRoom` names no live room.
pub const ROOM_NOT_FOUND: &str = "Room not found";

/// Sent to a caller when no free room code could be generated.
pub const NO_FREE_CODE: &str = "Could not allocate a room code";

/// Relay name for a prompt picked by a member without a name.
const PROMPT_FALLBACK_NAME: &str = "Host";

/// Relay name for chat from a member without a name.
const CHAT_FALLBACK_NAME: &str = "Anon";

/// Owns every open room and the connection-to-rooms index.
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, Room>,
    /// Rooms each connection has joined and not yet left, in join order.
    joined: HashMap<ConnectionId, IndexSet<RoomCode>>,
    gateway: EventGateway,
    codes: Box<dyn CodeGenerator>,
    max_code_attempts: usize,
}

impl RoomRegistry {
    /// Creates an empty registry with default settings and random codes.
    pub fn new(gateway: EventGateway) -> Self {
        Self::with_config(gateway, RegistryConfig::default())
    }

    /// Creates an empty registry with the given settings.
    pub fn with_config(gateway: EventGateway, config: RegistryConfig) -> Self {
        Self {
            rooms: HashMap::new(),
            joined: HashMap::new(),
            gateway,
            codes: Box::new(RandomCodes::new()),
            max_code_attempts: config.max_code_attempts.max(1),
        }
    }

    /// Replaces the room code source.
    pub fn with_code_generator(mut self, codes: impl CodeGenerator) -> Self {
        self.codes = Box::new(codes);
        self
    }

    // -----------------------------------------------------------------
    // Event entry point
    // -----------------------------------------------------------------

    /// Applies one client event.
    ///
    /// Failures stay silent except two, which go to the caller only:
    /// `joinRoom` on an unknown code (`errorJoin`) and `createRoom` when no
    /// code can be allocated (`errorCreate`). Everything else (unknown
    /// room, non-member, non-host) is logged and dropped so outsiders
    /// learn nothing about a room.
    pub fn handle(&mut self, from: ConnectionId, event: ClientEvent) {
        let event_name = event.name();
        let result = match event {
            ClientEvent::CreateRoom {
                name,
                language,
                layer,
            } => match self.create_room(from, name, language, layer) {
                Err(RoomError::CodeSpaceExhausted(attempts)) => {
                    tracing::warn!(%from, attempts, "room code space exhausted");
                    self.gateway.send_to(
                        from,
                        ServerEvent::ErrorCreate {
                            message: NO_FREE_CODE.into(),
                        },
                    );
                    Ok(())
                }
                other => other.map(drop),
            },
            ClientEvent::JoinRoom { room_id, name } => {
                match self.join_room(from, &room_id, name) {
                    Err(RoomError::NotFound(_)) => {
                        self.gateway.send_to(
                            from,
                            ServerEvent::ErrorJoin {
                                message: ROOM_NOT_FOUND.into(),
                            },
                        );
                        Ok(())
                    }
                    other => other,
                }
            }
            ClientEvent::LeaveRoom { room_id } => self.leave_room(from, &room_id),
            ClientEvent::ToggleReady { room_id } => {
                self.toggle_ready(from, &room_id).map(drop)
            }
            ClientEvent::StartRound { room_id, seed } => {
                self.start_round(from, &room_id, seed).map(drop)
            }
            ClientEvent::RequestPrompt { room_id, .. } => {
                self.request_prompt(from, &room_id)
            }
            ClientEvent::SelectedPrompt {
                room_id,
                prompt_obj,
            } => self.select_prompt(from, &room_id, prompt_obj),
            ClientEvent::Chat { room_id, msg } => self.chat(from, &room_id, msg),
        };

        if let Err(error) = result {
            tracing::debug!(%from, event = event_name, %error, "event dropped");
        }
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    /// Opens a room with `creator` as sole member and host.
    ///
    /// Sends `roomCreated` to the creator, then the first snapshot to the
    /// room.
    pub fn create_room(
        &mut self,
        creator: ConnectionId,
        name: Option<String>,
        language: Value,
        layer: Value,
    ) -> Result<RoomCode, RoomError> {
        let code = self.allocate_code()?;
        let room = Room::open(code.clone(), creator, name, language, layer);
        self.rooms.insert(code.clone(), room);
        self.track(creator, &code);
        self.gateway.join_group(creator, &code);

        tracing::info!(room = %code, %creator, "room created");

        self.gateway.send_to(
            creator,
            ServerEvent::RoomCreated {
                room_id: code.clone(),
            },
        );
        self.broadcast_snapshot(&code);
        Ok(code)
    }

    /// Adds `joiner` to a room. The host does not change.
    pub fn join_room(
        &mut self,
        joiner: ConnectionId,
        code: &RoomCode,
        name: Option<String>,
    ) -> Result<(), RoomError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        room.admit(joiner, name);
        let members = room.member_count();

        self.track(joiner, code);
        self.gateway.join_group(joiner, code);

        tracing::info!(room = %code, %joiner, members, "member joined");
        self.broadcast_snapshot(code);
        Ok(())
    }

    /// Removes `conn` from a room, migrating the host or destroying the
    /// room as needed.
    pub fn leave_room(
        &mut self,
        conn: ConnectionId,
        code: &RoomCode,
    ) -> Result<(), RoomError> {
        self.remove_member(conn, code)
    }

    /// Removes `conn` from every room it joined.
    ///
    /// Each room is cleaned up independently; a failure in one is logged
    /// and does not stop the rest. Returns the rooms that still exist
    /// afterwards and were sent a fresh snapshot.
    pub fn disconnect(&mut self, conn: ConnectionId) -> Vec<RoomCode> {
        let codes = self.joined.remove(&conn).unwrap_or_default();
        let mut surviving = Vec::with_capacity(codes.len());

        for code in codes {
            match self.remove_member(conn, &code) {
                Ok(()) if self.rooms.contains_key(&code) => surviving.push(code),
                Ok(()) => {}
                Err(error) => {
                    tracing::debug!(%conn, room = %code, %error, "disconnect cleanup skipped room");
                }
            }
        }

        let stray = self.gateway.disconnect(conn);
        if !stray.is_empty() {
            tracing::warn!(%conn, groups = stray.len(), "connection still subscribed at disconnect");
        }
        tracing::info!(%conn, rooms = surviving.len(), "connection cleaned up");
        surviving
    }

    // -----------------------------------------------------------------
    // In-room events
    // -----------------------------------------------------------------

    /// Flips the caller's ready flag and returns the new value.
    pub fn toggle_ready(
        &mut self,
        conn: ConnectionId,
        code: &RoomCode,
    ) -> Result<bool, RoomError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        let ready = room
            .toggle_ready(conn)
            .ok_or_else(|| RoomError::NotMember(conn, code.clone()))?;

        tracing::debug!(room = %code, %conn, ready, "ready toggled");
        self.broadcast_snapshot(code);
        Ok(ready)
    }

    /// Host only: advances the round and broadcasts `roundStarted`.
    ///
    /// Readiness is not consulted. A missing or falsy seed is replaced by
    /// the server clock in milliseconds.
    pub fn start_round(
        &mut self,
        conn: ConnectionId,
        code: &RoomCode,
        seed: Option<Value>,
    ) -> Result<u64, RoomError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        if room.host() != conn {
            return Err(RoomError::NotHost(conn, code.clone()));
        }
        let round = room.advance_round();
        let seed = seed_or_now(seed);

        tracing::info!(room = %code, round, "round started");
        self.gateway
            .broadcast(code, ServerEvent::RoundStarted { round, seed });
        Ok(round)
    }

    /// Intent to pick a prompt. Validated, never relayed.
    pub fn request_prompt(
        &mut self,
        conn: ConnectionId,
        code: &RoomCode,
    ) -> Result<(), RoomError> {
        let room = self.room_for(conn, code)?;
        if room.host() != conn {
            return Err(RoomError::NotHost(conn, code.clone()));
        }
        tracing::debug!(room = %code, %conn, "prompt requested");
        Ok(())
    }

    /// Relays a picked prompt to the room as `newPrompt`.
    ///
    /// Any member may send this; clients only let the host do so.
    pub fn select_prompt(
        &mut self,
        conn: ConnectionId,
        code: &RoomCode,
        prompt: Value,
    ) -> Result<(), RoomError> {
        let from = self.relay_name(conn, code, PROMPT_FALLBACK_NAME)?;
        self.gateway
            .broadcast(code, ServerEvent::NewPrompt { prompt, from });
        Ok(())
    }

    /// Relays a chat line to the room as `chatMessage`.
    pub fn chat(
        &mut self,
        conn: ConnectionId,
        code: &RoomCode,
        msg: Value,
    ) -> Result<(), RoomError> {
        let name = self.relay_name(conn, code, CHAT_FALLBACK_NAME)?;
        self.gateway
            .broadcast(code, ServerEvent::ChatMessage { name, msg });
        Ok(())
    }

    // -----------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------

    /// Looks up an open room.
    pub fn room(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    /// All open rooms, in no particular order.
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// Number of open rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Rooms `conn` is currently a member of, in join order.
    pub fn rooms_of(&self, conn: ConnectionId) -> Vec<RoomCode> {
        self.joined
            .get(&conn)
            .map(|codes| codes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The gateway this registry delivers through.
    pub fn gateway(&self) -> &EventGateway {
        &self.gateway
    }

    /// Mutable access to the gateway, for registering connections.
    pub fn gateway_mut(&mut self) -> &mut EventGateway {
        &mut self.gateway
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn allocate_code(&mut self) -> Result<RoomCode, RoomError> {
        for _ in 0..self.max_code_attempts {
            let candidate = self.codes.generate();
            match self.claimable(candidate) {
                Ok(code) => return Ok(code),
                Err(error) => tracing::debug!(%error, "retrying room code"),
            }
        }
        Err(RoomError::CodeSpaceExhausted(self.max_code_attempts))
    }

    /// Accepts `code` only if no live room holds it.
    fn claimable(&self, code: RoomCode) -> Result<RoomCode, RoomError> {
        if self.rooms.contains_key(&code) {
            Err(RoomError::DuplicateCode(code))
        } else {
            Ok(code)
        }
    }

    fn remove_member(
        &mut self,
        conn: ConnectionId,
        code: &RoomCode,
    ) -> Result<(), RoomError> {
        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;

        let departure = room
            .remove(conn)
            .ok_or_else(|| RoomError::NotMember(conn, code.clone()))?;
        self.gateway.leave_group(conn, code);
        self.untrack(conn, code);

        match departure {
            Departure::Emptied => {
                self.rooms.remove(code);
                tracing::info!(room = %code, %conn, "last member left, room destroyed");
            }
            Departure::Remaining { new_host } => {
                if let Some(host) = new_host {
                    tracing::info!(room = %code, from = %conn, to = %host, "host migrated");
                }
                tracing::info!(room = %code, %conn, "member left");
                self.broadcast_snapshot(code);
            }
        }
        Ok(())
    }

    fn room_for(&self, conn: ConnectionId, code: &RoomCode) -> Result<&Room, RoomError> {
        let room = self
            .rooms
            .get(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        if !room.is_member(conn) {
            return Err(RoomError::NotMember(conn, code.clone()));
        }
        Ok(room)
    }

    fn relay_name(
        &self,
        conn: ConnectionId,
        code: &RoomCode,
        fallback: &str,
    ) -> Result<String, RoomError> {
        let room = self.room_for(conn, code)?;
        let name = room
            .member(conn)
            .and_then(|member| member.display_name())
            .unwrap_or(fallback);
        Ok(name.to_owned())
    }

    fn broadcast_snapshot(&self, code: &RoomCode) {
        if let Some(room) = self.rooms.get(code) {
            self.gateway.broadcast(
                code,
                ServerEvent::RoomUpdate {
                    room: room.snapshot(),
                },
            );
        }
    }

    fn track(&mut self, conn: ConnectionId, code: &RoomCode) {
        self.joined.entry(conn).or_default().insert(code.clone());
    }

    fn untrack(&mut self, conn: ConnectionId, code: &RoomCode) {
        if let Some(codes) = self.joined.get_mut(&conn) {
            codes.shift_remove(code);
            if codes.is_empty() {
                self.joined.remove(&conn);
            }
        }
    }
}

/// Keeps a truthy client seed, otherwise substitutes wall-clock millis.
fn seed_or_now(seed: Option<Value>) -> Value {
    match seed {
        Some(seed) if !is_falsy(&seed) => seed,
        _ => Value::from(now_millis()),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
