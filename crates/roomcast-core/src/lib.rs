//! # roomcast-core
//!
//! Shared wire-level types for the roomcast relay:
//!
//! - [`Frame`]: the JSON message envelope exchanged over WebSocket
//! - [`RelayError`]: the protocol error taxonomy
//! - [`ConnectionId`]: branded connection identifier (UUID v7)
//! - [`room_name`]: room-name validation, bit-exact with the client SDK

#![deny(unsafe_code)]

pub mod error;
pub mod frame;
pub mod ids;
pub mod room_name;

pub use error::{RelayError, CLIENT_ERROR_CODE};
pub use frame::{
    ErrorInfo, Frame, EVENT_ALL, TYPE_ERROR, TYPE_MESSAGE, TYPE_PUBLISH, TYPE_SUBSCRIBE,
    TYPE_SUBSCRIBED, TYPE_UNSUBSCRIBE, TYPE_UNSUBSCRIBED,
};
pub use ids::ConnectionId;
