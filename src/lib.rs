//! Realtime room-based chat client core.
//!
//! This library implements the messaging layer of a chat-enabled application:
//! a persistent WebSocket connection with reconnect, room join/leave tracking,
//! message reconciliation across delivery paths, typing presence and a room
//! directory with unread aggregation. UI layers consume it through
//! [`session::ChatClient`] and its event subscriptions.

// layers
pub mod domain;
pub mod infrastructure;
pub mod session;

// shared library
pub mod common;
pub mod config;
