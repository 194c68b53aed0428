//! The relay hub: composition root for registry, room table and dispatch.
//!
//! Every mutation of relay state flows through here, which is what makes the
//! invariants checkable: connection `rooms` mirrors room membership after
//! every operation, rooms never outlive their last member, and every
//! disconnect flavor (explicit close, write failure, reaper) converges on
//! [`Hub::evict`].

use std::sync::Arc;
use std::time::Duration;

use roomcast_core::{ConnectionId, Frame, RelayError, EVENT_ALL};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::dispatch::fan_out;
use crate::registry::Registry;
use crate::rooms::{RoomInfo, RoomTable};
use crate::sink::FrameSink;

/// Engine tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct HubConfig {
    /// Maximum members per room; gates joins only.
    pub room_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { room_capacity: 50 }
    }
}

/// Read-only counters for the health endpoint.
#[derive(Clone, Copy, Debug)]
pub struct HubStats {
    /// Live connections.
    pub connections: usize,
    /// Live rooms.
    pub rooms: usize,
}

/// The relay engine.
pub struct Hub {
    registry: Registry,
    rooms: RoomTable,
}

impl Hub {
    /// Create a hub with the given configuration.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            registry: Registry::new(),
            rooms: RoomTable::new(config.room_capacity),
        }
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The room table.
    #[must_use]
    pub fn rooms(&self) -> &RoomTable {
        &self.rooms
    }

    /// Register a new connection under a fresh id.
    ///
    /// Infallible: id generation cannot collide. The connection becomes
    /// visible to dispatch and the reaper as soon as this returns.
    pub fn register(&self, subject: Option<String>, sink: Arc<dyn FrameSink>) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(subject, sink));
        self.registry.insert(conn.clone());
        info!(connection = %conn.id, subject = %conn.subject, "connection registered");
        conn
    }

    /// Look up a live connection.
    #[must_use]
    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.registry.get(id)
    }

    /// Join a room and add an event subscription.
    ///
    /// The default event when none is named is the `"signal:all"` wildcard.
    /// Monotonic: re-joining with a different event adds it to the
    /// subscription set. Returns the room's member count after the join.
    pub fn subscribe(
        &self,
        id: &ConnectionId,
        room: &str,
        event: Option<&str>,
    ) -> Result<usize, RelayError> {
        let conn = self
            .registry
            .get(id)
            .ok_or_else(|| RelayError::UnknownConnection(id.to_string()))?;

        let size = self.rooms.join(id, room)?;
        conn.add_room(room);
        let event = normalize_event(event);
        conn.subscribe(event);

        info!(
            connection = %id,
            subject = %conn.subject,
            room,
            event,
            room_size = size,
            "subscribed to room"
        );
        Ok(size)
    }

    /// Drop an event subscription, or leave the room entirely.
    ///
    /// A concrete, non-sentinel event removes only that subscription and
    /// leaves membership intact. An absent or sentinel event is a full
    /// leave: membership and room-scoped subscriptions go, and the room is
    /// destroyed if this empties it.
    pub fn unsubscribe(
        &self,
        id: &ConnectionId,
        room: &str,
        event: Option<&str>,
    ) -> Result<(), RelayError> {
        let conn = self
            .registry
            .get(id)
            .ok_or_else(|| RelayError::UnknownConnection(id.to_string()))?;

        match event {
            Some(name) if !name.is_empty() && name != EVENT_ALL => {
                conn.unsubscribe(name);
                info!(connection = %id, room, event = name, "event subscription removed");
            }
            _ => {
                let _ = self.rooms.remove_member(id, room);
                conn.remove_room(room);
                info!(connection = %id, room, "left room");
            }
        }
        Ok(())
    }

    /// Publish a payload to a room.
    ///
    /// Requires current membership (`NotAMember`); `RoomNotFound` if the
    /// room vanished in between. Resolves and dispatches synchronously in
    /// the caller's task, which is what gives per-sender per-room ordering.
    /// Returns the count of recipients the frame was handed to; delivery
    /// stays best-effort.
    pub fn publish(
        &self,
        id: &ConnectionId,
        room: &str,
        event: Option<&str>,
        data: Value,
    ) -> Result<usize, RelayError> {
        let conn = self
            .registry
            .get(id)
            .ok_or_else(|| RelayError::UnknownConnection(id.to_string()))?;
        if !conn.in_room(room) {
            return Err(RelayError::NotAMember(room.to_owned()));
        }
        let members = self
            .rooms
            .members(room)
            .ok_or_else(|| RelayError::RoomNotFound(room.to_owned()))?;

        let event = normalize_event(event);
        let frame = Frame::message(room, Some(event), data);
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                warn!(room, error = %e, "failed to serialize message frame");
                return Ok(0);
            }
        };
        let payload: Arc<str> = Arc::from(json);

        let outcome = fan_out(&self.registry, &members, id, Some(event), &payload);

        // Stale membership: eviction raced this publish. Repair the room.
        for stale in &outcome.stale {
            let _ = self.rooms.remove_member(stale, room);
        }
        // Dead send paths are presumed-dead connections.
        for closed in &outcome.closed {
            warn!(connection = %closed, room, "send path closed, evicting recipient");
            let _ = self.evict(closed);
        }

        debug!(
            connection = %id,
            subject = %conn.subject,
            room,
            event,
            recipients = outcome.delivered,
            room_size = members.len(),
            "message published"
        );
        Ok(outcome.delivered)
    }

    /// Tear down a connection. Idempotent; safe to race.
    ///
    /// Ordering: claim the teardown, clear room memberships (room lock
    /// only), release the send handle, then drop the registry entry — so no
    /// room ever holds an id the registry has already forgotten. Returns
    /// `true` for the caller that performed the teardown.
    pub fn evict(&self, id: &ConnectionId) -> bool {
        let Some(conn) = self.registry.get(id) else {
            return false;
        };
        if !conn.begin_close() {
            return false;
        }

        for room in conn.rooms_snapshot() {
            let _ = self.rooms.remove_member(id, &room);
            conn.remove_room(&room);
        }
        conn.close_sink();
        let _ = self.registry.remove(id);
        info!(connection = %id, "connection evicted");
        true
    }

    /// Evict every connection idle past `threshold`. Reaper entry point.
    pub fn evict_idle(&self, threshold: Duration) -> usize {
        let mut reaped = 0;
        for id in self.registry.idle(threshold) {
            if self.evict(&id) {
                info!(connection = %id, "idle connection reaped");
                reaped += 1;
            }
        }
        reaped
    }

    /// Drain every connection. Used on graceful shutdown.
    pub fn shutdown(&self) {
        for id in self.registry.ids() {
            let _ = self.evict(&id);
        }
    }

    /// Live counters for health reporting.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.registry.len(),
            rooms: self.rooms.len(),
        }
    }

    /// Diagnostics snapshot for one room.
    #[must_use]
    pub fn room_info(&self, room: &str) -> Option<RoomInfo> {
        self.rooms.info(room)
    }
}

/// Map an absent or empty event name to the wildcard.
fn normalize_event(event: Option<&str>) -> &str {
    match event {
        Some(name) if !name.is_empty() => name,
        _ => EVENT_ALL,
    }
}
