//! In-process delivery fabric: per-connection channels and multicast groups.
//!
//! The gateway knows nothing about rooms or events. It maps connection ids
//! to outbound channels and group keys to sets of connection ids, and it
//! delivers whatever message type `M` it is handed. Delivery is
//! fire-and-forget: a recipient whose channel is gone or full is skipped.
//! Nothing is ever queued beyond a connection's outbox capacity.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::ConnectionId;

/// Receiving half of a connection's outbound channel.
///
/// The connection's writer task drains this and pushes frames to the socket.
pub type Outbox<M> = mpsc::Receiver<M>;

/// Outbox capacity used by [`ConnectionGateway::new`].
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Connection registry with named multicast groups.
///
/// `K` is the group key (a room code for Partyline), `M` the message type.
/// Not thread-safe by itself: it is owned by a single task.
pub struct ConnectionGateway<K, M> {
    senders: HashMap<ConnectionId, mpsc::Sender<M>>,
    groups: HashMap<K, HashSet<ConnectionId>>,
    /// Reverse index so a disconnect can drop every subscription at once.
    subscriptions: HashMap<ConnectionId, HashSet<K>>,
    outbox_capacity: usize,
}

impl<K, M> ConnectionGateway<K, M>
where
    K: Clone + Eq + Hash,
    M: Clone,
{
    /// Creates an empty gateway with [`DEFAULT_OUTBOX_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTBOX_CAPACITY)
    }

    /// Creates an empty gateway whose outboxes hold at most `capacity`
    /// undelivered messages each.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            senders: HashMap::new(),
            groups: HashMap::new(),
            subscriptions: HashMap::new(),
            outbox_capacity: capacity.max(1),
        }
    }

    /// Registers a connection and returns the outbox it should drain.
    ///
    /// Registering an id twice replaces the previous channel; the old
    /// outbox then sees end-of-stream.
    pub fn connect(&mut self, id: ConnectionId) -> Outbox<M> {
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        if self.senders.insert(id, tx).is_some() {
            tracing::warn!(%id, "connection re-registered with gateway");
        }
        rx
    }

    /// Removes a connection and all of its group subscriptions.
    ///
    /// Returns the groups it belonged to. A second call for the same id
    /// returns an empty list.
    pub fn disconnect(&mut self, id: ConnectionId) -> Vec<K> {
        self.senders.remove(&id);
        let groups: Vec<K> = self
            .subscriptions
            .remove(&id)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for key in &groups {
            self.remove_from_group(id, key);
        }
        groups
    }

    /// Returns `true` if the connection is registered.
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.senders.contains_key(&id)
    }

    /// Subscribes a connection to a group.
    pub fn join_group(&mut self, id: ConnectionId, key: &K) {
        self.groups.entry(key.clone()).or_default().insert(id);
        self.subscriptions.entry(id).or_default().insert(key.clone());
    }

    /// Unsubscribes a connection from a group. Unknown pairs are ignored.
    pub fn leave_group(&mut self, id: ConnectionId, key: &K) {
        if let Some(set) = self.subscriptions.get_mut(&id) {
            set.remove(key);
            if set.is_empty() {
                self.subscriptions.remove(&id);
            }
        }
        self.remove_from_group(id, key);
    }

    /// Returns the connections currently subscribed to `key`.
    pub fn group_members(&self, key: &K) -> Vec<ConnectionId> {
        self.groups
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if `id` is subscribed to `key`.
    pub fn in_group(&self, id: ConnectionId, key: &K) -> bool {
        self.groups.get(key).is_some_and(|set| set.contains(&id))
    }

    /// Delivers a message to one connection. No-op if it is gone or its
    /// outbox is full.
    pub fn send_to(&self, id: ConnectionId, msg: M) {
        if let Some(sender) = self.senders.get(&id) {
            offer(id, sender, msg);
        }
    }

    /// Delivers a message to every connection subscribed to `key`.
    ///
    /// Returns how many recipients the message was handed to. Members
    /// with a full outbox miss this message.
    pub fn broadcast(&self, key: &K, msg: M) -> usize {
        let Some(members) = self.groups.get(key) else {
            return 0;
        };
        let mut delivered = 0;
        for id in members {
            if let Some(sender) = self.senders.get(id) {
                if offer(*id, sender, msg.clone()) {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Capacity of each connection's outbox.
    pub fn outbox_capacity(&self) -> usize {
        self.outbox_capacity
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    fn remove_from_group(&mut self, id: ConnectionId, key: &K) {
        if let Some(set) = self.groups.get_mut(key) {
            set.remove(&id);
            if set.is_empty() {
                self.groups.remove(key);
            }
        }
    }
}

/// Hands `msg` to `sender` without waiting. Returns `true` if queued.
fn offer<M>(id: ConnectionId, sender: &mpsc::Sender<M>, msg: M) -> bool {
    match sender.try_send(msg) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::debug!(%id, "outbox full, dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(%id, "dropping message for closed outbox");
            false
        }
    }
}

impl<K, M> Default for ConnectionGateway<K, M>
where
    K: Clone + Eq + Hash,
    M: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestGateway = ConnectionGateway<&'static str, String>;

    fn cid(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    #[test]
    fn test_send_to_delivers_to_single_connection() {
        let mut gw = TestGateway::new();
        let mut a = gw.connect(cid(1));
        let mut b = gw.connect(cid(2));

        gw.send_to(cid(1), "hello".into());

        assert_eq!(a.try_recv().unwrap(), "hello");
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn test_send_to_unknown_connection_is_noop() {
        let gw = TestGateway::new();
        gw.send_to(cid(99), "ignored".into());
    }

    #[test]
    fn test_broadcast_reaches_only_group_members() {
        let mut gw = TestGateway::new();
        let mut a = gw.connect(cid(1));
        let mut b = gw.connect(cid(2));
        let mut c = gw.connect(cid(3));
        gw.join_group(cid(1), &"room");
        gw.join_group(cid(2), &"room");

        let delivered = gw.broadcast(&"room", "update".into());

        assert_eq!(delivered, 2);
        assert_eq!(a.try_recv().unwrap(), "update");
        assert_eq!(b.try_recv().unwrap(), "update");
        assert!(c.try_recv().is_err());
    }

    #[test]
    fn test_leave_group_stops_delivery() {
        let mut gw = TestGateway::new();
        let mut a = gw.connect(cid(1));
        gw.join_group(cid(1), &"room");
        gw.leave_group(cid(1), &"room");

        assert_eq!(gw.broadcast(&"room", "update".into()), 0);
        assert!(a.try_recv().is_err());
        assert!(gw.group_members(&"room").is_empty());
    }

    #[test]
    fn test_connection_may_join_several_groups() {
        let mut gw = TestGateway::new();
        let _a = gw.connect(cid(1));
        gw.join_group(cid(1), &"x");
        gw.join_group(cid(1), &"y");

        assert!(gw.in_group(cid(1), &"x"));
        assert!(gw.in_group(cid(1), &"y"));
    }

    #[test]
    fn test_disconnect_returns_groups_once() {
        let mut gw = TestGateway::new();
        let _a = gw.connect(cid(1));
        gw.join_group(cid(1), &"x");
        gw.join_group(cid(1), &"y");

        let mut groups = gw.disconnect(cid(1));
        groups.sort();
        assert_eq!(groups, vec!["x", "y"]);
        assert!(!gw.is_connected(cid(1)));
        assert!(gw.group_members(&"x").is_empty());

        assert!(gw.disconnect(cid(1)).is_empty());
    }

    #[test]
    fn test_broadcast_skips_dropped_outbox() {
        let mut gw = TestGateway::new();
        let a = gw.connect(cid(1));
        let mut b = gw.connect(cid(2));
        gw.join_group(cid(1), &"room");
        gw.join_group(cid(2), &"room");
        drop(a);

        assert_eq!(gw.broadcast(&"room", "still here".into()), 1);
        assert_eq!(b.try_recv().unwrap(), "still here");
    }

    #[test]
    fn test_stalled_outbox_stays_at_capacity() {
        let mut gw = ConnectionGateway::<&'static str, u32>::with_capacity(8);
        let mut fast = gw.connect(cid(1));
        let mut stalled = gw.connect(cid(2));
        gw.join_group(cid(1), &"room");
        gw.join_group(cid(2), &"room");

        for n in 0..10_000 {
            gw.broadcast(&"room", n);
            while fast.try_recv().is_ok() {}
        }

        let mut queued = Vec::new();
        while let Ok(n) = stalled.try_recv() {
            queued.push(n);
        }
        assert_eq!(queued, (0..8).collect::<Vec<_>>());

        // Once drained, the stalled connection receives again.
        assert_eq!(gw.broadcast(&"room", 99), 2);
        assert_eq!(stalled.try_recv().unwrap(), 99);
    }

    #[test]
    fn test_send_to_full_outbox_is_dropped() {
        let mut gw = ConnectionGateway::<&'static str, u32>::with_capacity(1);
        let mut a = gw.connect(cid(1));

        gw.send_to(cid(1), 1);
        gw.send_to(cid(1), 2);

        assert_eq!(a.try_recv().unwrap(), 1);
        assert!(a.try_recv().is_err());
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let gw = TestGateway::with_capacity(0);
        assert_eq!(gw.outbox_capacity(), 1);
    }
}
