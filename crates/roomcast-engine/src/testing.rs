//! Test support: a channel-backed [`FrameSink`].
//!
//! Used by the engine's own tests and by downstream integration tests that
//! need to observe what a connection would have been sent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::sink::{FrameSink, SendResult};

/// A [`FrameSink`] backed by a bounded tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<str>>,
    closed: AtomicBool,
}

impl ChannelSink {
    /// Create a sink and the receiver observing its frames.
    #[must_use]
    pub fn new(depth: usize) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(depth);
        (
            Arc::new(Self {
                tx,
                closed: AtomicBool::new(false),
            }),
            rx,
        )
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&self, frame: Arc<str>) -> SendResult {
        if self.closed.load(Ordering::Relaxed) {
            return SendResult::Closed;
        }
        match self.tx.try_send(frame) {
            Ok(()) => SendResult::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => SendResult::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => SendResult::Closed,
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}
