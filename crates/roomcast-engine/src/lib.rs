//! # roomcast-engine
//!
//! The in-memory relay core:
//!
//! - [`Registry`]: connection-id → live connection map, the source of truth
//!   for "is this client still live"
//! - [`RoomTable`]: room-name → member-id set, with capacity enforcement and
//!   inline destruction of emptied rooms
//! - [`dispatch`]: recipient resolution and event filtering over a room
//!   snapshot
//! - [`Hub`]: composition root tying the above together; owns the one
//!   idempotent teardown path every disconnect flavor converges on
//! - [`reaper`]: background eviction of connections past the idle threshold
//!
//! Locking discipline: the room map and the connection map sit behind
//! separate `parking_lot` locks that are never held at the same time, and
//! never across I/O. Operations that touch both finish all room-table
//! mutation first, then mutate the connection side.

#![deny(unsafe_code)]

pub mod connection;
pub mod dispatch;
pub mod hub;
pub mod reaper;
pub mod registry;
pub mod rooms;
pub mod sink;
pub mod testing;

pub use connection::Connection;
pub use hub::{Hub, HubConfig, HubStats};
pub use reaper::run_reaper;
pub use registry::Registry;
pub use rooms::{RoomInfo, RoomTable};
pub use sink::{FrameSink, SendResult};
