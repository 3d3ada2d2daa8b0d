//! In-memory chat scrollback per room
//!
//! Each room keeps the last few raw `chatReceive` payloads in a bounded ring
//! guarded by its own lock. New viewers get a `chatHistoryClear` followed by
//! the ring contents, oldest first.

use crate::broadcast::Connection;
use crate::types::RoomId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

/// Default number of messages retained per room
pub const DEFAULT_SCROLLBACK_CAPACITY: usize = 20;

pub const CHAT_HISTORY_CLEAR: &str = "chatHistoryClear";
pub const CHAT_RECEIVE: &str = "chatReceive";

/// Fixed-capacity ring of the most recent payloads
#[derive(Debug)]
struct ChatRing {
    capacity: usize,
    entries: VecDeque<String>,
}

impl ChatRing {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, payload: String) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(payload);
    }
}

/// Per-room chat history used to seed newly joined clients
pub struct ChatScrollback {
    capacity: usize,
    rings: RwLock<HashMap<RoomId, Arc<Mutex<ChatRing>>>>,
}

impl ChatScrollback {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rings: RwLock::new(HashMap::new()),
        }
    }

    fn ring(&self, room: RoomId) -> Option<Arc<Mutex<ChatRing>>> {
        if let Some(ring) = self.rings.read().ok()?.get(&room) {
            return Some(ring.clone());
        }
        let mut rings = self.rings.write().ok()?;
        Some(
            rings
                .entry(room)
                .or_insert_with(|| Arc::new(Mutex::new(ChatRing::new(self.capacity))))
                .clone(),
        )
    }

    /// Record a payload, evicting the oldest once the ring is full
    pub fn append(&self, room: RoomId, payload: impl Into<String>) {
        let Some(ring) = self.ring(room) else {
            warn!("Scrollback map lock poisoned, dropping message for room {}", room);
            return;
        };
        if let Ok(mut ring) = ring.lock() {
            ring.push(payload.into());
        };
    }

    /// Send the clear signal and then the retained payloads to `sink`
    ///
    /// The room's lock is held for the whole replay so concurrent appends
    /// cannot interleave with it.
    pub fn replay(&self, room: RoomId, sink: &dyn Connection) {
        if let Err(e) = sink.emit(CHAT_HISTORY_CLEAR, "{}") {
            warn!("Failed to clear chat history on connection {}: {}", sink.id(), e);
            return;
        }

        let ring = match self.rings.read() {
            Ok(rings) => rings.get(&room).cloned(),
            Err(_) => None,
        };
        let Some(ring) = ring else {
            return;
        };
        let Ok(ring) = ring.lock() else {
            return;
        };

        for payload in &ring.entries {
            if let Err(e) = sink.emit(CHAT_RECEIVE, payload) {
                warn!("Scrollback replay to connection {} aborted: {}", sink.id(), e);
                return;
            }
        }
        debug!(
            "Replayed {} scrollback messages of room {} to connection {}",
            ring.entries.len(),
            room,
            sink.id()
        );
    }

    /// Snapshot of a room's retained payloads, oldest first
    pub fn messages(&self, room: RoomId) -> Vec<String> {
        let ring = match self.rings.read() {
            Ok(rings) => rings.get(&room).cloned(),
            Err(_) => None,
        };
        let Some(ring) = ring else {
            return Vec::new();
        };
        let messages = match ring.lock() {
            Ok(ring) => ring.entries.iter().cloned().collect(),
            Err(_) => Vec::new(),
        };
        messages
    }
}

impl Default for ChatScrollback {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLLBACK_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelConnection;

    fn drain(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<crate::broadcast::OutboundEvent>,
    ) -> Vec<(String, String)> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| (e.event, e.payload))
            .collect()
    }

    #[test]
    fn test_replay_of_unknown_room_only_clears() {
        let scrollback = ChatScrollback::default();
        let (conn, mut rx) = ChannelConnection::new();

        scrollback.replay(42, &conn);
        assert_eq!(
            drain(&mut rx),
            vec![(CHAT_HISTORY_CLEAR.to_string(), "{}".to_string())]
        );
    }

    #[test]
    fn test_replay_partial_ring_in_insertion_order() {
        let scrollback = ChatScrollback::default();
        for i in 0..3 {
            scrollback.append(1, format!("m{}", i));
        }
        let (conn, mut rx) = ChannelConnection::new();
        scrollback.replay(1, &conn);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].0, CHAT_HISTORY_CLEAR);
        let payloads: Vec<_> = events[1..].iter().map(|(_, p)| p.as_str()).collect();
        assert_eq!(payloads, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_ring_overwrites_oldest_after_capacity() {
        let scrollback = ChatScrollback::default();
        for i in 0..45 {
            scrollback.append(7, format!("m{}", i));
        }
        let messages = scrollback.messages(7);
        assert_eq!(messages.len(), DEFAULT_SCROLLBACK_CAPACITY);
        assert_eq!(messages.first().map(String::as_str), Some("m25"));
        assert_eq!(messages.last().map(String::as_str), Some("m44"));
    }

    #[test]
    fn test_rooms_are_independent() {
        let scrollback = ChatScrollback::new(2);
        scrollback.append(1, "a");
        scrollback.append(2, "b");
        assert_eq!(scrollback.messages(1), vec!["a"]);
        assert_eq!(scrollback.messages(2), vec!["b"]);
    }
}
