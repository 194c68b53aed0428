//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.
//!
//! Each session owns two halves. The outbound pump drains the connection's
//! send queue into the socket and emits periodic Ping frames; the inbound
//! loop decodes client frames and feeds them to the dispatcher. Either half
//! ending tears the whole session down through `Hub::evict`, the same path
//! the reaper uses.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use roomcast_core::Frame;
use roomcast_engine::{Connection, FrameSink, Hub, SendResult};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::handler::handle_frame;
use crate::metrics::{
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_DISCONNECTIONS_TOTAL, WS_FRAMES_IN_TOTAL,
};

/// Per-session tuning, derived from the `session` config section.
#[derive(Clone, Copy, Debug)]
pub struct SessionSettings {
    /// Interval between server-initiated Ping frames.
    pub heartbeat_interval: Duration,
    /// Outbound send queue depth.
    pub send_queue_depth: usize,
}

/// Bounded, non-blocking send path into one WebSocket session.
///
/// `send_frame` never awaits; a full queue drops the frame rather than
/// stalling a publisher. `close` cancels the session token, which stops
/// both halves of the session loop.
pub struct WsSink {
    tx: mpsc::Sender<Arc<str>>,
    cancel: CancellationToken,
}

impl FrameSink for WsSink {
    fn send_frame(&self, frame: Arc<str>) -> SendResult {
        if self.cancel.is_cancelled() {
            return SendResult::Closed;
        }
        match self.tx.try_send(frame) {
            Ok(()) => SendResult::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => SendResult::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => SendResult::Closed,
        }
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

/// Run a WebSocket session until the client disconnects, the relay evicts
/// it, or the server shuts down.
#[instrument(skip_all, fields(subject = subject.as_deref().unwrap_or("")))]
pub async fn run_session(
    ws: WebSocket,
    hub: Arc<Hub>,
    settings: SessionSettings,
    subject: Option<String>,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();

    let (send_tx, send_rx) = mpsc::channel::<Arc<str>>(settings.send_queue_depth);
    let cancel = shutdown.child_token();
    let sink = Arc::new(WsSink {
        tx: send_tx,
        cancel: cancel.clone(),
    });

    let conn = hub.register(subject, sink);
    let started = std::time::Instant::now();
    info!(connection = %conn.id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let outbound = tokio::spawn(outbound_pump(
        ws_tx,
        send_rx,
        settings.heartbeat_interval,
        cancel.clone(),
    ));

    // Inbound loop.
    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            () = cancel.cancelled() => {
                debug!(connection = %conn.id, "session cancelled");
                break;
            }
        };
        let Some(Ok(msg)) = msg else {
            break;
        };

        let text = match msg {
            Message::Text(ref t) => Some(t.to_string()),
            Message::Binary(ref data) => match std::str::from_utf8(data) {
                Ok(s) => Some(s.to_owned()),
                Err(_) => {
                    debug!(connection = %conn.id, len = data.len(), "non-UTF8 binary frame ignored");
                    None
                }
            },
            Message::Close(_) => {
                info!(connection = %conn.id, "client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                conn.mark_alive();
                None
            }
        };
        let Some(text) = text else { continue };

        conn.mark_alive();
        counter!(WS_FRAMES_IN_TOTAL).increment(1);

        let reply = match dispatch_frame(&hub, &conn, &text) {
            Ok(reply) => reply,
            Err(()) => break,
        };
        if let Some(reply) = reply {
            match serde_json::to_string(&reply) {
                Ok(json) => {
                    if conn.send(Arc::from(json)) == SendResult::Closed {
                        break;
                    }
                }
                Err(e) => warn!(connection = %conn.id, error = %e, "failed to serialize reply"),
            }
        }
    }

    // Teardown. Evict is idempotent, so racing the reaper here is fine.
    let _ = hub.evict(&conn.id);
    cancel.cancel();
    let _ = outbound.await;

    info!(connection = %conn.id, "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

/// Outbound pump: drains queued frames into the socket and emits periodic
/// Pings.
///
/// Cancels the session token on the way out, so a write failure (including a
/// failed Ping on a half-dead transport) tears the whole session down
/// instead of leaving the inbound half waiting on a read that may never
/// return.
async fn outbound_pump<S>(
    mut ws_tx: S,
    mut send_rx: mpsc::Receiver<Arc<str>>,
    heartbeat_interval: Duration,
    cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin,
{
    let mut ping_interval = tokio::time::interval(heartbeat_interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            frame = send_rx.recv() => {
                match frame {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }
    cancel.cancel();
}

/// Fault boundary around frame processing.
///
/// A panic while handling one frame must not abort the session task before
/// the eviction at the end of [`run_session`] runs; it is caught here and
/// surfaces as `Err` so the session closes through the normal teardown path.
fn dispatch_frame(
    hub: &Hub,
    conn: &Arc<Connection>,
    text: &str,
) -> Result<Option<Frame>, ()> {
    std::panic::catch_unwind(AssertUnwindSafe(|| handle_frame(hub, conn, text))).map_err(|cause| {
        let reason = cause
            .downcast_ref::<&str>()
            .copied()
            .map(str::to_owned)
            .or_else(|| cause.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_owned());
        error!(connection = %conn.id, %reason, "frame handling panicked, closing session");
    })
}
