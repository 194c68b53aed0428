//! Inbound frame dispatch.
//!
//! One text frame in, at most one direct reply out. Room fan-out happens
//! inside the hub; the reply returned here goes only to the sending client.

use std::sync::Arc;

use roomcast_core::{
    Frame, RelayError, EVENT_ALL, TYPE_PUBLISH, TYPE_SUBSCRIBE, TYPE_UNSUBSCRIBE,
};
use metrics::{counter, gauge};
use roomcast_engine::{Connection, Hub};
use serde_json::Value;
use tracing::debug;

use crate::metrics::{MESSAGES_PUBLISHED_TOTAL, ROOMS_ACTIVE};

/// Process one inbound text frame from a connected client.
///
/// Returns the frame to send back to this client, if any. Protocol errors
/// never tear the session down; they come back as `error` frames.
pub fn handle_frame(hub: &Hub, conn: &Arc<Connection>, text: &str) -> Option<Frame> {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(connection = %conn.id, error = %e, "unparseable frame");
            return Some(Frame::from_error(&RelayError::MalformedMessage(
                "invalid JSON message".into(),
            )));
        }
    };

    debug!(
        connection = %conn.id,
        kind = %frame.kind,
        channel = frame.channel.as_deref().unwrap_or(""),
        event = frame.event.as_deref().unwrap_or(""),
        "frame received"
    );

    match frame.kind.as_str() {
        TYPE_SUBSCRIBE => handle_subscribe(hub, conn, &frame),
        TYPE_UNSUBSCRIBE => handle_unsubscribe(hub, conn, &frame),
        TYPE_PUBLISH => handle_publish(hub, conn, frame),
        other => Some(Frame::from_error(&RelayError::UnsupportedType(
            other.to_owned(),
        ))),
    }
}

fn require_channel(frame: &Frame) -> Result<&str, RelayError> {
    match frame.channel.as_deref() {
        Some(channel) if !channel.is_empty() => Ok(channel),
        _ => Err(RelayError::MalformedMessage("missing channel name".into())),
    }
}

fn handle_subscribe(hub: &Hub, conn: &Arc<Connection>, frame: &Frame) -> Option<Frame> {
    let result = require_channel(frame).and_then(|channel| {
        hub.subscribe(&conn.id, channel, frame.event.as_deref())
            .map(|_| channel)
    });
    match result {
        Ok(channel) => {
            gauge!(ROOMS_ACTIVE).set(hub.stats().rooms as f64);
            let event = frame.event.as_deref().filter(|e| !e.is_empty());
            Some(Frame::subscribed(channel, event.unwrap_or(EVENT_ALL)))
        }
        Err(e) => Some(Frame::from_error(&e)),
    }
}

fn handle_unsubscribe(hub: &Hub, conn: &Arc<Connection>, frame: &Frame) -> Option<Frame> {
    let result = require_channel(frame).and_then(|channel| {
        hub.unsubscribe(&conn.id, channel, frame.event.as_deref())
            .map(|()| channel)
    });
    match result {
        Ok(channel) => {
            gauge!(ROOMS_ACTIVE).set(hub.stats().rooms as f64);
            let event = frame.event.as_deref().filter(|e| !e.is_empty());
            Some(Frame::unsubscribed(channel, event.unwrap_or(EVENT_ALL)))
        }
        Err(e) => Some(Frame::from_error(&e)),
    }
}

fn handle_publish(hub: &Hub, conn: &Arc<Connection>, frame: Frame) -> Option<Frame> {
    let channel = match require_channel(&frame) {
        Ok(channel) => channel.to_owned(),
        Err(e) => return Some(Frame::from_error(&e)),
    };

    // Payloads must be JSON objects so a sender identity can be attached.
    let mut data = match frame.data {
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Some(Frame::from_error(&RelayError::MalformedMessage(
                "invalid message data".into(),
            )))
        }
        None => {
            return Some(Frame::from_error(&RelayError::MalformedMessage(
                "missing message data".into(),
            )))
        }
    };
    data.entry("from".to_owned())
        .or_insert_with(|| Value::String(conn.subject.clone()));

    match hub.publish(
        &conn.id,
        &channel,
        frame.event.as_deref(),
        Value::Object(data),
    ) {
        Ok(_) => {
            counter!(MESSAGES_PUBLISHED_TOTAL).increment(1);
            None
        }
        Err(e) => Some(Frame::from_error(&e)),
    }
}
