//! Payload for the `GET /health` probe.

use std::time::Instant;

use roomcast_engine::HubStats;
use serde::Serialize;

/// What `/health` reports.
///
/// The counters are read from the hub at request time, so they reflect the
/// registry and room table as they are now, not a cached gauge.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub connections: usize,
    pub rooms: usize,
}

impl HealthResponse {
    /// Snapshot the relay's health.
    #[must_use]
    pub fn capture(started: Instant, stats: &HubStats) -> Self {
        Self {
            status: "ok",
            uptime_secs: started.elapsed().as_secs(),
            connections: stats.connections,
            rooms: stats.rooms,
        }
    }
}
