//! Room-scoped fan-out of events to subscribed connections
//!
//! Membership is tracked here rather than by the transport. A broadcast
//! snapshots the member list under the read lock and emits outside of it,
//! so membership changes never tear a broadcast already in flight.

use crate::broadcast::connection::Connection;
use crate::metrics::MetricsCollector;
use crate::types::{ConnectionId, PlayerId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

#[derive(Default)]
struct Membership {
    /// Every live connection by id
    connections: HashMap<ConnectionId, Arc<dyn Connection>>,
    /// Current connection of each logged-in player
    users: HashMap<PlayerId, ConnectionId>,
    /// Connection ids subscribed to each room, in subscription order
    rooms: HashMap<String, BTreeSet<ConnectionId>>,
}

/// Delivers events to rooms and to individual players
pub struct RoomBroadcaster {
    membership: RwLock<Membership>,
    metrics: Arc<MetricsCollector>,
}

impl RoomBroadcaster {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            membership: RwLock::new(Membership::default()),
            metrics,
        }
    }

    /// Register a new connection, optionally bound to a logged-in player
    ///
    /// A player reconnecting replaces their previous connection in the user
    /// index, and the new connection takes over the old one's rooms.
    pub fn connect(&self, player: Option<&PlayerId>, conn: Arc<dyn Connection>) {
        let conn_id = conn.id();
        let Ok(mut membership) = self.membership.write() else {
            warn!("Membership lock poisoned, dropping connection {}", conn_id);
            return;
        };
        membership.connections.insert(conn_id, conn);
        let Some(player) = player else {
            debug!("Anonymous connection {} registered", conn_id);
            return;
        };

        let previous = membership.users.insert(player.clone(), conn_id);
        let mut moved = 0;
        if let Some(old_id) = previous.filter(|id| *id != conn_id) {
            for members in membership.rooms.values_mut() {
                if members.remove(&old_id) {
                    members.insert(conn_id);
                    moved += 1;
                }
            }
        }
        debug!(
            "Connection {} registered for player {} ({} rooms carried over)",
            conn_id, player, moved
        );
    }

    /// Forget a connection and drop it from every room
    pub fn disconnect(&self, conn_id: ConnectionId) {
        let Ok(mut membership) = self.membership.write() else {
            return;
        };
        membership.connections.remove(&conn_id);
        membership.users.retain(|_, id| *id != conn_id);
        membership.rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
        debug!("Connection {} disconnected", conn_id);
    }

    /// Current connection of a player, if any
    pub fn connection_of(&self, player: &PlayerId) -> Option<Arc<dyn Connection>> {
        let membership = self.membership.read().ok()?;
        let conn_id = membership.users.get(player)?;
        membership.connections.get(conn_id).cloned()
    }

    /// Subscribe a connection to a room
    pub fn subscribe(&self, room: &str, conn_id: ConnectionId) -> bool {
        let Ok(mut membership) = self.membership.write() else {
            return false;
        };
        if !membership.connections.contains_key(&conn_id) {
            return false;
        }
        membership
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id)
    }

    /// Subscribe a player's current connection to a room
    pub fn subscribe_user(&self, room: &str, player: &PlayerId) -> bool {
        let conn_id = {
            let Ok(membership) = self.membership.read() else {
                return false;
            };
            match membership.users.get(player) {
                Some(id) => *id,
                None => return false,
            }
        };
        self.subscribe(room, conn_id)
    }

    /// Remove a connection from a room
    pub fn unsubscribe(&self, room: &str, conn_id: ConnectionId) -> bool {
        let Ok(mut membership) = self.membership.write() else {
            return false;
        };
        let Some(members) = membership.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&conn_id);
        if members.is_empty() {
            membership.rooms.remove(room);
        }
        removed
    }

    /// Remove a player's current connection from a room
    pub fn unsubscribe_user(&self, room: &str, player: &PlayerId) -> bool {
        let conn_id = {
            let Ok(membership) = self.membership.read() else {
                return false;
            };
            match membership.users.get(player) {
                Some(id) => *id,
                None => return false,
            }
        };
        self.unsubscribe(room, conn_id)
    }

    /// Drop a room and every subscription to it
    ///
    /// Returns the number of connections that were removed.
    pub fn close_room(&self, room: &str) -> usize {
        let Ok(mut membership) = self.membership.write() else {
            return 0;
        };
        let removed = membership.rooms.remove(room).map_or(0, |members| members.len());
        debug!("Closed room {} ({} members removed)", room, removed);
        removed
    }

    /// Whether a connection currently belongs to a room
    pub fn is_subscribed(&self, room: &str, conn_id: ConnectionId) -> bool {
        self.membership
            .read()
            .map(|m| m.rooms.get(room).is_some_and(|r| r.contains(&conn_id)))
            .unwrap_or(false)
    }

    /// Number of connections in a room
    pub fn room_size(&self, room: &str) -> usize {
        self.membership
            .read()
            .map(|m| m.rooms.get(room).map_or(0, |r| r.len()))
            .unwrap_or(0)
    }

    /// Deliver an event to every connection subscribed to `room`
    ///
    /// Returns the number of successful deliveries. Failed writes are logged
    /// and not retried.
    pub fn send_to_room(&self, room: &str, event: &str, payload: &str) -> usize {
        let members: Vec<Arc<dyn Connection>> = {
            let Ok(membership) = self.membership.read() else {
                warn!("Membership lock poisoned, dropping {} for {}", event, room);
                return 0;
            };
            match membership.rooms.get(room) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| membership.connections.get(id).cloned())
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut delivered = 0;
        for conn in &members {
            match conn.emit(event, payload) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        "Failed to deliver {} to connection {} in {}: {}",
                        event,
                        conn.id(),
                        room,
                        e
                    );
                    self.metrics.record_delivery_failure();
                }
            }
        }

        debug!(
            "Broadcast {} to {} ({}/{} delivered)",
            event,
            room,
            delivered,
            members.len()
        );
        self.metrics.record_broadcast(event);
        delivered
    }

    /// Deliver an event to a single player's current connection, if connected
    pub fn send_to_user(&self, player: &PlayerId, event: &str, payload: &str) -> bool {
        let Some(conn) = self.connection_of(player) else {
            debug!("Player {} has no connection, dropping {}", player, event);
            return false;
        };
        match conn.emit(event, payload) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to deliver {} to player {}: {}", event, player, e);
                self.metrics.record_delivery_failure();
                false
            }
        }
    }
}
