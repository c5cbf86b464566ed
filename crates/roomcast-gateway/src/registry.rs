//! Room membership registry
//!
//! Maps a room key to the set of connections in it. A room key is present
//! only while its set is non-empty. One mutex guards the map; it is held for
//! lookups, mutations and member snapshots, never while sending.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use tracing::debug;

use crate::connection::ConnectionHandle;

/// Room → members
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, HashSet<ConnectionHandle>>>,
    max_connections: Option<usize>,
}

impl RoomRegistry {
    /// Create an unbounded registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that refuses joins beyond `max_connections` members in total
    pub fn with_max_connections(max_connections: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            max_connections: Some(max_connections),
        }
    }

    /// Add `conn` to the room recorded on it, creating the room if needed
    ///
    /// Returns `Ok(false)` if the connection was already a member.
    pub fn join(&self, conn: &ConnectionHandle) -> Result<bool, RegistryError> {
        let mut rooms = self.rooms.lock();

        if let Some(max) = self.max_connections {
            let already_member = rooms
                .get(conn.room())
                .is_some_and(|members| members.contains(conn));
            let total: usize = rooms.values().map(HashSet::len).sum();
            if !already_member && total >= max {
                return Err(RegistryError::Full(max));
            }
        }

        let inserted = rooms
            .entry(conn.room().to_string())
            .or_default()
            .insert(conn.clone());
        Ok(inserted)
    }

    /// Remove a connection from `room`, dropping the room once it is empty
    ///
    /// Absent room or connection is a no-op. Returns whether anything was removed.
    pub fn remove(&self, connection_id: &str, room: &str) -> bool {
        let mut rooms = self.rooms.lock();
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };

        let before = members.len();
        members.retain(|member| member.id() != connection_id);
        let removed = members.len() != before;

        if members.is_empty() {
            rooms.remove(room);
            debug!("Room {} is empty, dropped", room);
        }
        removed
    }

    /// Send `payload` under `event` to every member of `room`
    ///
    /// Returns how many members the event was handed to. Unknown rooms
    /// and closed member channels are skipped silently.
    pub fn broadcast(
        &self,
        room: &str,
        event: &str,
        payload: &str,
        sent_at: DateTime<FixedOffset>,
    ) -> usize {
        self.deliver(room, event, payload, sent_at, None)
    }

    /// Like [`RoomRegistry::broadcast`], skipping `excluded_id`
    pub fn broadcast_except(
        &self,
        room: &str,
        event: &str,
        payload: &str,
        sent_at: DateTime<FixedOffset>,
        excluded_id: &str,
    ) -> usize {
        self.deliver(room, event, payload, sent_at, Some(excluded_id))
    }

    fn deliver(
        &self,
        room: &str,
        event: &str,
        payload: &str,
        sent_at: DateTime<FixedOffset>,
        excluded_id: Option<&str>,
    ) -> usize {
        let targets = self.members(room);

        let mut delivered = 0;
        for member in targets {
            if excluded_id == Some(member.id()) {
                continue;
            }
            match member.emit(event, payload, sent_at) {
                Ok(()) => delivered += 1,
                Err(e) => debug!("Failed to send to connection {}: {}", member.id(), e),
            }
        }
        delivered
    }

    /// Snapshot of the members of `room`
    pub fn members(&self, room: &str) -> Vec<ConnectionHandle> {
        let rooms = self.rooms.lock();
        rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys of all non-empty rooms
    pub fn rooms(&self) -> Vec<String> {
        self.rooms.lock().keys().cloned().collect()
    }

    pub fn contains_room(&self, room: &str) -> bool {
        self.rooms.lock().contains_key(room)
    }

    pub fn is_member(&self, connection_id: &str, room: &str) -> bool {
        self.rooms
            .lock()
            .get(room)
            .is_some_and(|members| members.iter().any(|m| m.id() == connection_id))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().len()
    }

    /// Total members across all rooms
    pub fn connection_count(&self) -> usize {
        self.rooms.lock().values().map(HashSet::len).sum()
    }
}

/// Registry-related errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Registry full ({0} connections)")]
    Full(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ZoneClock;
    use crate::protocol::RelayEvent;
    use tokio::sync::mpsc;

    fn conn(id: &str, room: &str) -> (ConnectionHandle, mpsc::UnboundedReceiver<RelayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::with_id(id, room, None, tx), rx)
    }

    fn payloads(rx: &mut mpsc::UnboundedReceiver<RelayEvent>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RelayEvent::Emit { payload, .. } = event {
                out.push(payload);
            }
        }
        out
    }

    #[test]
    fn test_join_creates_room() {
        let registry = RoomRegistry::new();
        let (a, _rx) = conn("a", "lobby");

        assert!(!registry.contains_room("lobby"));
        assert_eq!(registry.join(&a), Ok(true));
        assert_eq!(registry.join(&a), Ok(false));
        assert!(registry.is_member("a", "lobby"));
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = RoomRegistry::new();
        let (a, _rx_a) = conn("a", "lobby");
        let (b, _rx_b) = conn("b", "lobby");
        registry.join(&a).unwrap();
        registry.join(&b).unwrap();

        assert!(registry.remove("a", "lobby"));
        let after_once = registry.members("lobby");
        assert!(!registry.remove("a", "lobby"));
        let after_twice = registry.members("lobby");

        assert_eq!(after_once, after_twice);
        assert_eq!(after_twice, vec![b]);
    }

    #[test]
    fn test_remove_unknown_room_is_noop() {
        let registry = RoomRegistry::new();
        assert!(!registry.remove("ghost", "nowhere"));
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_last_member_prunes_room() {
        let registry = RoomRegistry::new();
        let (a, mut rx) = conn("a", "lobby");
        registry.join(&a).unwrap();

        registry.remove("a", "lobby");

        assert!(!registry.contains_room("lobby"));
        assert!(registry.rooms().is_empty());
        assert_eq!(registry.broadcast("lobby", "chat message", "x", ZoneClock::sentinel()), 0);
        assert!(payloads(&mut rx).is_empty());
    }

    #[test]
    fn test_broadcast_fans_out_within_room_only() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = conn("a", "r1");
        let (b, mut rx_b) = conn("b", "r1");
        let (c, mut rx_c) = conn("c", "r2");
        for member in [&a, &b, &c] {
            registry.join(member).unwrap();
        }

        let delivered = registry.broadcast("r1", "chat message", "hello", ZoneClock::sentinel());

        assert_eq!(delivered, 2);
        assert_eq!(payloads(&mut rx_a), vec!["hello"]);
        assert_eq!(payloads(&mut rx_b), vec!["hello"]);
        assert!(payloads(&mut rx_c).is_empty());
    }

    #[test]
    fn test_broadcast_except_skips_sender() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = conn("a", "lobby");
        let (b, mut rx_b) = conn("b", "lobby");
        registry.join(&a).unwrap();
        registry.join(&b).unwrap();

        let delivered =
            registry.broadcast_except("lobby", "chat message", "hi", ZoneClock::sentinel(), "a");

        assert_eq!(delivered, 1);
        assert!(payloads(&mut rx_a).is_empty());
        assert_eq!(payloads(&mut rx_b), vec!["hi"]);
    }

    #[test]
    fn test_failed_send_does_not_block_others() {
        let registry = RoomRegistry::new();
        let (a, rx_a) = conn("a", "lobby");
        let (b, mut rx_b) = conn("b", "lobby");
        let (c, mut rx_c) = conn("c", "lobby");
        for member in [&a, &b, &c] {
            registry.join(member).unwrap();
        }
        drop(rx_a);

        let delivered = registry.broadcast("lobby", "chat message", "still here", ZoneClock::sentinel());

        assert_eq!(delivered, 2);
        assert_eq!(payloads(&mut rx_b), vec!["still here"]);
        assert_eq!(payloads(&mut rx_c), vec!["still here"]);
        // Delivery failure does not change membership.
        assert!(registry.is_member("a", "lobby"));
    }

    #[test]
    fn test_capacity_limit() {
        let registry = RoomRegistry::with_max_connections(2);
        let (a, _rx_a) = conn("a", "r1");
        let (b, _rx_b) = conn("b", "r2");
        let (c, _rx_c) = conn("c", "r1");

        registry.join(&a).unwrap();
        registry.join(&b).unwrap();
        assert_eq!(registry.join(&c), Err(RegistryError::Full(2)));
        // Rejoining an existing member is not counted twice.
        assert_eq!(registry.join(&a), Ok(false));

        registry.remove("b", "r2");
        assert_eq!(registry.join(&c), Ok(true));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutation_matches_serial_outcome() {
        let registry = std::sync::Arc::new(RoomRegistry::new());
        let mut receivers = Vec::new();
        let mut tasks = Vec::new();

        for i in 0..64 {
            let room = format!("room-{}", i % 4);
            let (tx, rx) = mpsc::unbounded_channel();
            receivers.push(rx);
            let handle = ConnectionHandle::with_id(format!("c{}", i), room.clone(), None, tx);
            let registry = registry.clone();

            tasks.push(tokio::spawn(async move {
                registry.join(&handle).unwrap();
                registry.broadcast(&room, "chat message", "ping", ZoneClock::sentinel());
                tokio::task::yield_now().await;
                // Odd connections leave again, twice to exercise idempotence.
                if i % 2 == 1 {
                    registry.remove(handle.id(), &room);
                    registry.remove(handle.id(), &room);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.room_count(), 4);
        assert_eq!(registry.connection_count(), 32);
        for r in 0..4 {
            let mut ids: Vec<String> = registry
                .members(&format!("room-{}", r))
                .iter()
                .map(|m| m.id().to_string())
                .collect();
            ids.sort();
            let mut expected: Vec<String> = (0..64)
                .filter(|i| i % 4 == r && i % 2 == 0)
                .map(|i| format!("c{}", i))
                .collect();
            expected.sort();
            assert_eq!(ids, expected);
        }
    }
}
