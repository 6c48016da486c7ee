//! Wire types: everything that travels between browser and server.
//!
//! Every frame is a JSON object tagged by its `event` name, with the
//! event's fields alongside it in camelCase:
//!
//! ```text
//! {"event":"joinRoom","roomId":"K7QXP","name":"Bob"}
//! {"event":"roomUpdate","room":{"hostConnectionId":3,...}}
//! ```
//!
//! Game configuration, seeds, prompts and chat bodies are carried as
//! [`serde_json::Value`]: the server forwards them and never looks inside.

use std::fmt;

use indexmap::IndexMap;
use partyline_transport::ConnectionId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// RoomCode
// ---------------------------------------------------------------------------

/// The short, human-enterable code that names a live room.
///
/// Codes are compared exactly; the server never normalises case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Wraps a code string.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomCode {
    fn from(code: &str) -> Self {
        Self(code.to_owned())
    }
}

impl From<String> for RoomCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One member as shown to the room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberView {
    /// Display name as supplied by the client; `null` if none was given.
    pub name: Option<String>,
    /// Whether the member has flagged themselves ready.
    pub ready: bool,
}

/// Full room state, retransmitted after every membership-affecting change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// The connection currently allowed to start rounds.
    pub host_connection_id: ConnectionId,
    /// Members in join order, keyed by connection id.
    pub members: IndexMap<ConnectionId, MemberView>,
    /// Opaque game language chosen at creation.
    pub language: Value,
    /// Opaque game layer chosen at creation.
    pub layer: Value,
    /// Number of rounds the host has started.
    pub round: u64,
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Events a client can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Open a new room with the caller as its only member and host.
    CreateRoom {
        #[serde(default, deserialize_with = "loose_name")]
        name: Option<String>,
        #[serde(default)]
        language: Value,
        #[serde(default)]
        layer: Value,
    },

    /// Join an existing room by code.
    JoinRoom {
        room_id: RoomCode,
        #[serde(default, deserialize_with = "loose_name")]
        name: Option<String>,
    },

    /// Leave a room.
    LeaveRoom { room_id: RoomCode },

    /// Flip the caller's ready flag.
    ToggleReady { room_id: RoomCode },

    /// Host only: advance the round counter.
    StartRound {
        room_id: RoomCode,
        #[serde(default)]
        seed: Option<Value>,
    },

    /// Announces intent to pick a prompt. Carries no payload and is
    /// never relayed; the pick itself arrives as `SelectedPrompt`.
    RequestPrompt {
        room_id: RoomCode,
        #[serde(default, rename = "type")]
        kind: Value,
        #[serde(default)]
        language: Value,
        #[serde(default)]
        layer: Value,
    },

    /// Relay the chosen prompt to the room.
    SelectedPrompt {
        room_id: RoomCode,
        #[serde(default)]
        prompt_obj: Value,
    },

    /// Relay a chat line to the room.
    Chat {
        room_id: RoomCode,
        #[serde(default)]
        msg: Value,
    },
}

impl ClientEvent {
    /// The event's wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "createRoom",
            Self::JoinRoom { .. } => "joinRoom",
            Self::LeaveRoom { .. } => "leaveRoom",
            Self::ToggleReady { .. } => "toggleReady",
            Self::StartRound { .. } => "startRound",
            Self::RequestPrompt { .. } => "requestPrompt",
            Self::SelectedPrompt { .. } => "selectedPrompt",
            Self::Chat { .. } => "chat",
        }
    }
}

/// Names are not validated: any JSON value is accepted and kept as text.
/// `null` means no name.
fn loose_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(name) => Some(name),
        other => Some(other.to_string()),
    })
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Events the server sends, either to one connection or to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// First frame on every connection: the id the server knows it by.
    Connected { connection_id: ConnectionId },

    /// To the creator: the code of the room it just opened.
    RoomCreated { room_id: RoomCode },

    /// To a room: its full current state.
    RoomUpdate { room: RoomSnapshot },

    /// To a caller whose `joinRoom` failed.
    ErrorJoin { message: String },

    /// To a caller whose `createRoom` could not allocate a code.
    ErrorCreate { message: String },

    /// To a room: the host started a new round.
    RoundStarted { round: u64, seed: Value },

    /// To a room: a prompt was picked.
    NewPrompt { prompt: Value, from: String },

    /// To a room: a chat line.
    ChatMessage { name: String, msg: Value },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_code_serializes_as_plain_string() {
        let json = serde_json::to_string(&RoomCode::from("AB3CD")).unwrap();
        assert_eq!(json, "\"AB3CD\"");
    }

    #[test]
    fn test_create_room_decodes_with_opaque_config() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "createRoom",
            "name": "Ann",
            "language": "en",
            "layer": 1
        }))
        .unwrap();

        assert_eq!(
            event,
            ClientEvent::CreateRoom {
                name: Some("Ann".into()),
                language: json!("en"),
                layer: json!(1),
            }
        );
    }

    #[test]
    fn test_create_room_tolerates_missing_fields() {
        let event: ClientEvent =
            serde_json::from_value(json!({ "event": "createRoom" })).unwrap();
        assert_eq!(
            event,
            ClientEvent::CreateRoom {
                name: None,
                language: Value::Null,
                layer: Value::Null,
            }
        );
    }

    #[test]
    fn test_start_round_null_seed_is_none() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "startRound",
            "roomId": "AAAAA",
            "seed": null
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::StartRound {
                room_id: "AAAAA".into(),
                seed: None,
            }
        );
    }

    #[test]
    fn test_request_prompt_reads_type_field() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "requestPrompt",
            "roomId": "AAAAA",
            "type": "truth"
        }))
        .unwrap();
        match event {
            ClientEvent::RequestPrompt { kind, .. } => assert_eq!(kind, json!("truth")),
            other => panic!("expected RequestPrompt, got {other:?}"),
        }
    }

    #[test]
    fn test_selected_prompt_uses_camel_case_field() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "selectedPrompt",
            "roomId": "AAAAA",
            "promptObj": { "type": "dare", "text": "sing" }
        }))
        .unwrap();
        assert_eq!(event.name(), "selectedPrompt");
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_value(json!({ "event": "flyToMoon" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_room_id_is_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_value(json!({ "event": "joinRoom", "name": "Bob" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_room_update_json_shape() {
        let mut members = IndexMap::new();
        members.insert(
            ConnectionId::new(4),
            MemberView {
                name: Some("Ann".into()),
                ready: false,
            },
        );
        let event = ServerEvent::RoomUpdate {
            room: RoomSnapshot {
                host_connection_id: ConnectionId::new(4),
                members,
                language: json!("en"),
                layer: json!(1),
                round: 0,
            },
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            json!({
                "event": "roomUpdate",
                "room": {
                    "hostConnectionId": 4,
                    "members": { "4": { "name": "Ann", "ready": false } },
                    "language": "en",
                    "layer": 1,
                    "round": 0
                }
            })
        );
    }

    #[test]
    fn test_room_update_decodes_member_keys() {
        let event: ServerEvent = serde_json::from_value(json!({
            "event": "roomUpdate",
            "room": {
                "hostConnectionId": 2,
                "members": {
                    "2": { "name": "Ann", "ready": true },
                    "5": { "name": null, "ready": false }
                },
                "language": null,
                "layer": null,
                "round": 3
            }
        }))
        .unwrap();

        let ServerEvent::RoomUpdate { room } = event else {
            panic!("expected RoomUpdate");
        };
        let ids: Vec<u64> = room.members.keys().map(|id| id.into_inner()).collect();
        assert_eq!(ids, vec![2, 5]);
        assert_eq!(room.members[&ConnectionId::new(5)].name, None);
    }

    #[test]
    fn test_round_started_json_shape() {
        let json = serde_json::to_value(ServerEvent::RoundStarted {
            round: 2,
            seed: json!(42),
        })
        .unwrap();
        assert_eq!(json, json!({ "event": "roundStarted", "round": 2, "seed": 42 }));
    }

    #[test]
    fn test_connected_json_shape() {
        let json = serde_json::to_value(ServerEvent::Connected {
            connection_id: ConnectionId::new(11),
        })
        .unwrap();
        assert_eq!(json, json!({ "event": "connected", "connectionId": 11 }));
    }

    #[test]
    fn test_non_string_names_are_kept_as_text() {
        let create: ClientEvent = serde_json::from_value(json!({
            "event": "createRoom",
            "name": 42,
            "language": "en",
            "layer": 1
        }))
        .unwrap();
        assert!(matches!(
            create,
            ClientEvent::CreateRoom { name: Some(ref name), .. } if name == "42"
        ));

        let join: ClientEvent = serde_json::from_value(json!({
            "event": "joinRoom",
            "roomId": "ABCDE",
            "name": true
        }))
        .unwrap();
        assert_eq!(
            join,
            ClientEvent::JoinRoom {
                room_id: RoomCode::from("ABCDE"),
                name: Some("true".into()),
            }
        );
    }

    #[test]
    fn test_null_name_is_no_name() {
        let join: ClientEvent = serde_json::from_value(json!({
            "event": "joinRoom",
            "roomId": "ABCDE",
            "name": null
        }))
        .unwrap();
        assert_eq!(
            join,
            ClientEvent::JoinRoom {
                room_id: RoomCode::from("ABCDE"),
                name: None,
            }
        );
    }
}
