//! A single room: members in join order, the host, and opaque config.

use indexmap::IndexMap;
use partyline_protocol::{MemberView, RoomCode, RoomSnapshot};
use partyline_transport::ConnectionId;
use serde_json::Value;

/// A connection's presence record inside one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Display name as supplied; not unique, not validated.
    pub name: Option<String>,
    /// Toggled by the member. Has no effect on starting rounds.
    pub ready: bool,
}

impl Member {
    fn new(name: Option<String>) -> Self {
        Self { name, ready: false }
    }

    /// The name to show next to relayed content, if there is one.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }
}

/// What removing a member did to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Departure {
    /// The last member left. The room must be dropped.
    Emptied,
    /// Members remain. `new_host` is set if the host role moved.
    Remaining { new_host: Option<ConnectionId> },
}

/// An open room.
///
/// Invariant: `members` is never empty and `host` is always one of its
/// keys. The registry drops a room the moment [`Departure::Emptied`] is
/// returned, so no code path observes an empty room.
#[derive(Debug, Clone)]
pub struct Room {
    code: RoomCode,
    host: ConnectionId,
    /// Insertion order is join order; the first entry inherits the host role.
    members: IndexMap<ConnectionId, Member>,
    language: Value,
    layer: Value,
    round: u64,
}

impl Room {
    /// Opens a room with `creator` as sole member and host.
    pub(crate) fn open(
        code: RoomCode,
        creator: ConnectionId,
        name: Option<String>,
        language: Value,
        layer: Value,
    ) -> Self {
        let mut members = IndexMap::new();
        members.insert(creator, Member::new(name));
        Self {
            code,
            host: creator,
            members,
            language,
            layer,
            round: 0,
        }
    }

    /// The room's code.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// The current host.
    pub fn host(&self) -> ConnectionId {
        self.host
    }

    /// Rounds started so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Opaque language chosen at creation.
    pub fn language(&self) -> &Value {
        &self.language
    }

    /// Opaque layer chosen at creation.
    pub fn layer(&self) -> &Value {
        &self.layer
    }

    /// Members in join order.
    pub fn members(&self) -> impl Iterator<Item = (ConnectionId, &Member)> {
        self.members.iter().map(|(id, member)| (*id, member))
    }

    /// Looks up one member.
    pub fn member(&self, id: ConnectionId) -> Option<&Member> {
        self.members.get(&id)
    }

    /// Returns `true` if `id` is a member.
    pub fn is_member(&self, id: ConnectionId) -> bool {
        self.members.contains_key(&id)
    }

    /// Number of members.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Adds a member, or re-admits an existing one in place with the new
    /// name and `ready` cleared. The host never changes here.
    pub(crate) fn admit(&mut self, id: ConnectionId, name: Option<String>) {
        self.members.insert(id, Member::new(name));
    }

    /// Removes a member and migrates the host role if needed.
    ///
    /// Returns `None`, changing nothing, if `id` is not a member.
    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<Departure> {
        self.members.shift_remove(&id)?;
        let Some((&first, _)) = self.members.first() else {
            return Some(Departure::Emptied);
        };
        if self.host == id {
            self.host = first;
            Some(Departure::Remaining {
                new_host: Some(first),
            })
        } else {
            Some(Departure::Remaining { new_host: None })
        }
    }

    /// Flips a member's ready flag and returns the new value.
    pub(crate) fn toggle_ready(&mut self, id: ConnectionId) -> Option<bool> {
        let member = self.members.get_mut(&id)?;
        member.ready = !member.ready;
        Some(member.ready)
    }

    /// Advances the round counter and returns the new round.
    pub(crate) fn advance_round(&mut self) -> u64 {
        self.round += 1;
        self.round
    }

    /// Full state as sent to clients.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            host_connection_id: self.host,
            members: self
                .members
                .iter()
                .map(|(id, member)| {
                    (
                        *id,
                        MemberView {
                            name: member.name.clone(),
                            ready: member.ready,
                        },
                    )
                })
                .collect(),
            language: self.language.clone(),
            layer: self.layer.clone(),
            round: self.round,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn room_with(ids: &[u64]) -> Room {
        let mut room = Room::open(
            RoomCode::from("TESTS"),
            cid(ids[0]),
            Some(format!("p{}", ids[0])),
            json!("en"),
            json!(1),
        );
        for id in &ids[1..] {
            room.admit(cid(*id), Some(format!("p{id}")));
        }
        room
    }

    #[test]
    fn test_open_makes_creator_host() {
        let room = room_with(&[1]);
        assert_eq!(room.host(), cid(1));
        assert_eq!(room.member_count(), 1);
        assert_eq!(room.round(), 0);
        assert!(!room.member(cid(1)).unwrap().ready);
    }

    #[test]
    fn test_remove_host_promotes_earliest_joiner() {
        let mut room = room_with(&[1, 2, 3]);
        assert_eq!(
            room.remove(cid(1)),
            Some(Departure::Remaining {
                new_host: Some(cid(2))
            })
        );
        assert_eq!(room.host(), cid(2));
    }

    #[test]
    fn test_remove_non_host_keeps_host() {
        let mut room = room_with(&[1, 2, 3]);
        assert_eq!(room.remove(cid(2)), Some(Departure::Remaining { new_host: None }));
        assert_eq!(room.host(), cid(1));
    }

    #[test]
    fn test_remove_last_member_empties() {
        let mut room = room_with(&[1]);
        assert_eq!(room.remove(cid(1)), Some(Departure::Emptied));
    }

    #[test]
    fn test_remove_stranger_is_noop() {
        let mut room = room_with(&[1, 2]);
        assert_eq!(room.remove(cid(9)), None);
        assert_eq!(room.member_count(), 2);
        assert_eq!(room.host(), cid(1));
    }

    #[test]
    fn test_readmit_keeps_position_and_resets_ready() {
        let mut room = room_with(&[1, 2, 3]);
        room.toggle_ready(cid(2));
        room.admit(cid(2), Some("renamed".into()));

        let order: Vec<_> = room.members().map(|(id, _)| id).collect();
        assert_eq!(order, vec![cid(1), cid(2), cid(3)]);
        let member = room.member(cid(2)).unwrap();
        assert_eq!(member.name.as_deref(), Some("renamed"));
        assert!(!member.ready);
    }

    #[test]
    fn test_toggle_ready_flips() {
        let mut room = room_with(&[1]);
        assert_eq!(room.toggle_ready(cid(1)), Some(true));
        assert_eq!(room.toggle_ready(cid(1)), Some(false));
        assert_eq!(room.toggle_ready(cid(5)), None);
    }

    #[test]
    fn test_display_name_treats_empty_as_missing() {
        assert_eq!(Member::new(Some(String::new())).display_name(), None);
        assert_eq!(Member::new(None).display_name(), None);
        assert_eq!(Member::new(Some("Ann".into())).display_name(), Some("Ann"));
    }

    #[test]
    fn test_snapshot_preserves_join_order() {
        let room = room_with(&[5, 3, 9]);
        let snapshot = room.snapshot();
        let order: Vec<_> = snapshot.members.keys().copied().collect();
        assert_eq!(order, vec![cid(5), cid(3), cid(9)]);
        assert_eq!(snapshot.host_connection_id, cid(5));
        assert_eq!(snapshot.language, json!("en"));
    }
}
