//! Error types for the chat client core.

use thiserror::Error;

/// Validation errors for domain value objects
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required string value was empty
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// A string value exceeded its maximum length
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// A value did not parse into its expected shape
    #[error("invalid {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    /// Direct rooms must have exactly two distinct participants
    #[error("direct rooms must have exactly two distinct participants")]
    DirectRoomArity,
}

/// Transport-level errors (connection establishment and wire I/O)
#[derive(Debug, Error)]
pub enum TransportError {
    /// The handshake with the messaging server was rejected
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The connection was closed by the peer
    #[error("connection closed")]
    Closed,

    /// A frame could not be serialized or deserialized
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Errors surfaced to callers of the public client API.
///
/// Only explicit user actions (send, edit, delete, join, room-list fetch)
/// fail with these; everything else is recovered internally.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The command requires a live connection and there is none
    #[error("not connected to the messaging server")]
    NotConnected,

    /// The connection dropped while the command was awaiting acknowledgment
    #[error("connection lost before the command was acknowledged")]
    ConnectionLost,

    /// No acknowledgment arrived within the command timeout
    #[error("timed out waiting for server acknowledgment")]
    Timeout,

    /// The server rejected the command
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// A command argument failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The room-list fetch failed
    #[error("room list fetch failed: {0}")]
    RoomList(String),

    /// The client session has been shut down
    #[error("chat session is closed")]
    SessionClosed,
}

/// Errors from the REST history service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// The request could not be performed
    #[error("history request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status
    #[error("history service returned status {0}")]
    Status(u16),

    /// The response body could not be decoded
    #[error("history response could not be decoded: {0}")]
    Decode(String),
}

/// Errors from the identity provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// A bearer token could not be obtained
    #[error("bearer token unavailable: {0}")]
    Token(String),
}
