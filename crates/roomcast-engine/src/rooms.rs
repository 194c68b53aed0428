//! The room table: room name → member-id set.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use roomcast_core::{room_name, ConnectionId, RelayError};
use serde::Serialize;
use tracing::debug;

/// A named broadcast domain.
///
/// Members are connection *ids*, never connection references: rooms resolve
/// to live connections only through the registry at the moment of use, which
/// keeps ownership acyclic.
struct Room {
    members: HashSet<ConnectionId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Room {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            members: HashSet::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Read-only room snapshot for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct RoomInfo {
    /// Room name.
    pub name: String,
    /// Current member count.
    pub members: usize,
    /// Configured member limit.
    pub capacity: usize,
    /// When the room was created.
    pub created_at: DateTime<Utc>,
    /// Last membership change.
    pub updated_at: DateTime<Utc>,
}

/// Map of all live rooms, with capacity enforced on join.
///
/// A room exists exactly while it has members: it is created on first join
/// and destroyed inline the moment its member set empties, so a recycled
/// name never carries state from past occupants.
pub struct RoomTable {
    rooms: RwLock<HashMap<String, Room>>,
    capacity: usize,
}

impl RoomTable {
    /// Create a table with the given per-room member limit.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Per-room member limit.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add `id` to `room`, creating the room on first reference.
    ///
    /// Validates the room name (`InvalidName`) and the member limit
    /// (`RoomFull`). Capacity gates new joins only: an existing member
    /// re-joining never fails on capacity grounds. Returns the member count
    /// after the join.
    pub fn join(&self, id: &ConnectionId, room: &str) -> Result<usize, RelayError> {
        room_name::validate(room)?;

        let mut rooms = self.rooms.write();
        let entry = rooms.entry(room.to_owned()).or_insert_with(Room::new);
        if entry.members.len() >= self.capacity && !entry.members.contains(id) {
            let err = RelayError::RoomFull {
                room: room.to_owned(),
                limit: self.capacity,
            };
            // An over-capacity first join must not leave an empty room behind.
            if entry.members.is_empty() {
                let _ = rooms.remove(room);
            }
            return Err(err);
        }
        let _ = entry.members.insert(id.clone());
        entry.updated_at = Utc::now();
        Ok(entry.members.len())
    }

    /// Remove `id` from `room`, destroying the room if it empties.
    ///
    /// Returns `true` if the membership existed. A missing room or member is
    /// a no-op.
    pub fn remove_member(&self, id: &ConnectionId, room: &str) -> bool {
        let mut rooms = self.rooms.write();
        let Some(entry) = rooms.get_mut(room) else {
            return false;
        };
        let removed = entry.members.remove(id);
        entry.updated_at = Utc::now();
        if entry.members.is_empty() {
            let _ = rooms.remove(room);
            debug!(room, "empty room destroyed");
        }
        removed
    }

    /// Snapshot of a room's members. `None` if the room does not exist.
    #[must_use]
    pub fn members(&self, room: &str) -> Option<Vec<ConnectionId>> {
        self.rooms
            .read()
            .get(room)
            .map(|r| r.members.iter().cloned().collect())
    }

    /// Current member count. `None` if the room does not exist.
    #[must_use]
    pub fn member_count(&self, room: &str) -> Option<usize> {
        self.rooms.read().get(room).map(|r| r.members.len())
    }

    /// Diagnostics snapshot for one room.
    #[must_use]
    pub fn info(&self, room: &str) -> Option<RoomInfo> {
        self.rooms.read().get(room).map(|r| RoomInfo {
            name: room.to_owned(),
            members: r.members.len(),
            capacity: self.capacity,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }

    /// Number of live rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    /// Whether there are no live rooms.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }

    /// Snapshot of all room names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.rooms.read().keys().cloned().collect()
    }
}
