//! The connection registry: id → live connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use roomcast_core::ConnectionId;

use crate::connection::Connection;

/// Map of all live connections, the single source of truth for liveness.
///
/// Purely a map: membership bookkeeping and teardown ordering live in
/// [`Hub`](crate::Hub). No method blocks on I/O and the internal lock is
/// released before any method returns.
#[derive(Default)]
pub struct Registry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a connection under its id. Infallible: ids are fresh UUIDs.
    pub fn insert(&self, connection: Arc<Connection>) {
        let _ = self
            .connections
            .write()
            .insert(connection.id.clone(), connection);
    }

    /// Non-blocking lookup.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }

    /// Remove and return a connection. `None` if already gone.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.write().remove(id)
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Snapshot of all connection ids.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().keys().cloned().collect()
    }

    /// Ids of connections idle past `threshold`, for the reaper.
    #[must_use]
    pub fn idle(&self, threshold: Duration) -> Vec<ConnectionId> {
        self.connections
            .read()
            .values()
            .filter(|c| c.idle_for() > threshold)
            .map(|c| c.id.clone())
            .collect()
    }
}
