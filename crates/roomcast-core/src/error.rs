//! Protocol error taxonomy.
//!
//! Every variant here is recoverable: the session layer converts it into an
//! `error`-typed outbound frame and keeps the connection open. Only
//! transport-level failures and eviction terminate a session.

use thiserror::Error;

/// Wire error code for client protocol errors.
///
/// The paired SDK expects a single `400` code and distinguishes failures by
/// message text, so every [`RelayError`] maps to it.
pub const CLIENT_ERROR_CODE: i64 = 400;

/// Why a room name failed validation.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum NameError {
    /// Fewer than the minimum number of code points.
    #[error("room name too short: at least 2 characters required")]
    TooShort,
    /// More than the maximum number of code points.
    #[error("room name too long: at most 12 characters allowed")]
    TooLong,
    /// Contains a character outside the allowed class.
    #[error("room name may only contain Han characters, letters, digits, spaces, underscores and hyphens")]
    BadCharacters,
}

/// Errors produced by the relay engine and frame handling.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The room name failed validation.
    #[error("invalid room name: {0}")]
    InvalidName(#[from] NameError),

    /// The room is at capacity and the joiner is not already a member.
    #[error("room {room} is full: at most {limit} members allowed")]
    RoomFull {
        /// Room that rejected the join.
        room: String,
        /// Configured member limit.
        limit: usize,
    },

    /// Publish attempted without a prior join.
    #[error("not a member of room: {0}")]
    NotAMember(String),

    /// The room vanished between the membership check and the publish.
    #[error("room not found: {0}")]
    RoomNotFound(String),

    /// An operation referenced a connection no longer in the registry.
    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    /// Undecodable frame or missing required field.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// Unrecognized inbound message type.
    #[error("unsupported message type: {0}")]
    UnsupportedType(String),
}

impl RelayError {
    /// Wire error code carried in the outbound `error` frame.
    #[must_use]
    pub const fn code(&self) -> i64 {
        CLIENT_ERROR_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_errors_distinguish_reasons() {
        assert!(NameError::TooShort.to_string().contains("too short"));
        assert!(NameError::TooLong.to_string().contains("too long"));
        assert!(NameError::BadCharacters.to_string().contains("only contain"));
    }

    #[test]
    fn invalid_name_wraps_reason() {
        let err = RelayError::from(NameError::TooShort);
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn room_full_names_limit() {
        let err = RelayError::RoomFull {
            room: "demo".into(),
            limit: 50,
        };
        let msg = err.to_string();
        assert!(msg.contains("demo"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn all_variants_use_client_error_code() {
        let errors = [
            RelayError::InvalidName(NameError::TooLong),
            RelayError::RoomFull {
                room: "r1".into(),
                limit: 2,
            },
            RelayError::NotAMember("r1".into()),
            RelayError::RoomNotFound("r1".into()),
            RelayError::UnknownConnection("c1".into()),
            RelayError::MalformedMessage("bad json".into()),
            RelayError::UnsupportedType("ping".into()),
        ];
        for err in errors {
            assert_eq!(err.code(), 400);
        }
    }
}
