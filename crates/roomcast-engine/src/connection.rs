//! Per-connection state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use roomcast_core::{ConnectionId, EVENT_ALL};

use crate::sink::{FrameSink, SendResult};

/// A live relay connection.
///
/// Owned exclusively by the [`Registry`](crate::Registry) once registered and
/// shared as `Arc<Connection>`. Room membership here mirrors the
/// [`RoomTable`](crate::RoomTable); the two are kept in sync by the
/// [`Hub`](crate::Hub), which is the only writer of either side.
pub struct Connection {
    /// Unique connection id, generated at registration, never reused.
    pub id: ConnectionId,
    /// Caller-declared identity, stamped into outbound `from` fields.
    /// Falls back to the connection id. Never used for authorization.
    pub subject: String,
    /// Send capability owned by the transport layer.
    sink: Arc<dyn FrameSink>,
    /// Names of rooms this connection currently belongs to.
    rooms: Mutex<HashSet<String>>,
    /// Subscribed event names; `"signal:all"` means everything.
    subscriptions: Mutex<HashSet<String>>,
    /// Last inbound frame or liveness-probe response.
    last_seen: Mutex<Instant>,
    /// Claimed once by the teardown path.
    closing: AtomicBool,
    /// Frames dropped because the send queue was full.
    pub dropped_frames: AtomicU64,
}

impl Connection {
    /// Create a connection with a fresh id.
    pub fn new(subject: Option<String>, sink: Arc<dyn FrameSink>) -> Self {
        let id = ConnectionId::new();
        let subject = subject
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| id.as_str().to_owned());
        Self {
            id,
            subject,
            sink,
            rooms: Mutex::new(HashSet::new()),
            subscriptions: Mutex::new(HashSet::new()),
            last_seen: Mutex::new(Instant::now()),
            closing: AtomicBool::new(false),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Hand a serialized frame to this connection's send path.
    ///
    /// Increments the drop counter when the queue is full. Never blocks.
    pub fn send(&self, frame: Arc<str>) -> SendResult {
        let result = self.sink.send_frame(frame);
        if result == SendResult::Dropped {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Release the send handle, closing the transport.
    pub fn close_sink(&self) {
        self.sink.close();
    }

    /// Record liveness (inbound frame or probe response).
    pub fn mark_alive(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last liveness signal.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Claim the teardown path.
    ///
    /// Returns `true` for exactly one caller; every later caller gets `false`
    /// and must treat the eviction as already done.
    pub fn begin_close(&self) -> bool {
        !self.closing.swap(true, Ordering::SeqCst)
    }

    // ── room membership mirror ──────────────────────────────────────

    /// Record membership in `room`.
    pub fn add_room(&self, room: &str) {
        let _ = self.rooms.lock().insert(room.to_owned());
    }

    /// Drop membership in `room` and clear the event subscriptions tied to
    /// room traffic (everything except the `"signal:all"` wildcard, which is
    /// connection-wide).
    pub fn remove_room(&self, room: &str) {
        let _ = self.rooms.lock().remove(room);
        self.subscriptions.lock().retain(|e| e == EVENT_ALL);
    }

    /// Whether this connection belongs to `room`.
    pub fn in_room(&self, room: &str) -> bool {
        self.rooms.lock().contains(room)
    }

    /// Snapshot of current room memberships.
    pub fn rooms_snapshot(&self) -> Vec<String> {
        self.rooms.lock().iter().cloned().collect()
    }

    // ── event subscriptions ─────────────────────────────────────────

    /// Add an event subscription.
    pub fn subscribe(&self, event: &str) {
        let _ = self.subscriptions.lock().insert(event.to_owned());
    }

    /// Remove a single event subscription.
    pub fn unsubscribe(&self, event: &str) {
        let _ = self.subscriptions.lock().remove(event);
    }

    /// Delivery eligibility for a published event.
    ///
    /// An absent or sentinel event requires the wildcard subscription; a
    /// concrete event matches its own subscription or the wildcard.
    pub fn wants(&self, event: Option<&str>) -> bool {
        let subs = self.subscriptions.lock();
        match event {
            None | Some("") | Some(EVENT_ALL) => subs.contains(EVENT_ALL),
            Some(name) => subs.contains(name) || subs.contains(EVENT_ALL),
        }
    }
}
