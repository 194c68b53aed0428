//! The JSON frame envelope exchanged over the WebSocket.
//!
//! Inbound types: `subscribe`, `unsubscribe`, `publish`. Outbound types:
//! `subscribed`, `unsubscribed`, `message`, `error`. The `type` field is kept
//! as a plain string so an unrecognized inbound type can be echoed back in
//! the error reply instead of failing deserialization.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// Wildcard event: deliver every publish in the room.
pub const EVENT_ALL: &str = "signal:all";

/// Inbound frame type: join a room / add an event subscription.
pub const TYPE_SUBSCRIBE: &str = "subscribe";
/// Inbound frame type: leave a room or drop one event subscription.
pub const TYPE_UNSUBSCRIBE: &str = "unsubscribe";
/// Inbound frame type: broadcast a payload to a room.
pub const TYPE_PUBLISH: &str = "publish";
/// Outbound frame type: subscribe confirmation.
pub const TYPE_SUBSCRIBED: &str = "subscribed";
/// Outbound frame type: unsubscribe confirmation.
pub const TYPE_UNSUBSCRIBED: &str = "unsubscribed";
/// Outbound frame type: relayed room message.
pub const TYPE_MESSAGE: &str = "message";
/// Outbound frame type: protocol error reply.
pub const TYPE_ERROR: &str = "error";

/// Error payload carried by `error` frames.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

/// A single WebSocket message in either direction.
///
/// Timestamps are milliseconds since epoch, stamped when the frame is
/// constructed, not when it is delivered.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Message type; see the `TYPE_*` constants.
    #[serde(rename = "type")]
    pub kind: String,
    /// Room / channel name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Event name within the room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Message payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Milliseconds since epoch at construction time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Error payload, present only on `error` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl Frame {
    /// Build a relayed `message` frame.
    #[must_use]
    pub fn message(channel: &str, event: Option<&str>, data: Value) -> Self {
        Self {
            kind: TYPE_MESSAGE.to_owned(),
            channel: Some(channel.to_owned()),
            event: event.map(str::to_owned),
            data: Some(data),
            timestamp: Some(now_millis()),
            error: None,
        }
    }

    /// Build a `subscribed` confirmation.
    #[must_use]
    pub fn subscribed(channel: &str, event: &str) -> Self {
        Self {
            kind: TYPE_SUBSCRIBED.to_owned(),
            channel: Some(channel.to_owned()),
            event: Some(event.to_owned()),
            data: Some(serde_json::json!({
                "status": "subscribed",
                "room": channel,
            })),
            timestamp: Some(now_millis()),
            error: None,
        }
    }

    /// Build an `unsubscribed` confirmation.
    #[must_use]
    pub fn unsubscribed(channel: &str, event: &str) -> Self {
        Self {
            kind: TYPE_UNSUBSCRIBED.to_owned(),
            channel: Some(channel.to_owned()),
            event: Some(event.to_owned()),
            data: Some(serde_json::json!({
                "status": "unsubscribed",
                "room": channel,
            })),
            timestamp: Some(now_millis()),
            error: None,
        }
    }

    /// Build an `error` reply frame.
    #[must_use]
    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self {
            kind: TYPE_ERROR.to_owned(),
            channel: None,
            event: None,
            data: None,
            timestamp: Some(now_millis()),
            error: Some(ErrorInfo {
                code,
                message: message.into(),
            }),
        }
    }

    /// Build an `error` reply from a [`RelayError`].
    #[must_use]
    pub fn from_error(err: &RelayError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}
