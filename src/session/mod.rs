//! Session layer: the client runtime and its per-concern components.
//!
//! [`ChatClient`] is the public entry point; everything else backs its
//! single serialized event loop.

pub mod client;
pub(crate) mod connection;
pub mod directory;
pub mod events;
pub mod handle;
pub mod membership;
pub mod reconcile;
pub(crate) mod typing;

pub use client::ChatClient;
pub use events::EventBus;
pub use handle::RoomSession;
