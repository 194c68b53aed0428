//! The transport seam: a narrow capability for delivering frames to one
//! connection. The engine never sees the concrete transport type.

use std::sync::Arc;

/// Outcome of handing a frame to a connection's send path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendResult {
    /// Frame was enqueued for delivery.
    Sent,
    /// Send queue was full; the frame was dropped (best-effort delivery).
    Dropped,
    /// The send path is gone; the connection is presumed dead.
    Closed,
}

/// Capability for delivering outbound frames to a single connection.
///
/// Implemented by the transport adapter (a bounded channel feeding the
/// WebSocket write task in production). `send_frame` must never block:
/// a slow reader is decoupled from the publisher by its own queue.
pub trait FrameSink: Send + Sync {
    /// Enqueue one serialized frame.
    fn send_frame(&self, frame: Arc<str>) -> SendResult;

    /// Tear down the underlying transport. Must be idempotent.
    fn close(&self);
}
