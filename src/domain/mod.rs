//! Domain layer: entities, value objects, events and the interfaces the
//! session runtime depends on.

pub mod entity;
pub mod error;
pub mod event;
pub mod history;
pub mod identity;
pub mod transport;
pub mod value_object;

pub use entity::{ChatMessage, Room, RoomKind, RoomPreview, TypingIndicator};
pub use error::{CommandError, HistoryError, IdentityError, TransportError, ValidationError};
pub use event::{
    AckOutcome, ClientCommand, ConnectionState, CorrelationId, DirectoryEvent, MessageEvent,
    RoomLoadState, ServerEvent, TypingEvent, Typist,
};
pub use history::HistoryService;
pub use identity::{IdentityProvider, StaticIdentity};
pub use transport::{HandshakeAuth, Transport, TransportConnection};
pub use value_object::{ImageRef, MessageBody, MessageId, RoomId, Timestamp, UserId};

#[cfg(test)]
pub use history::MockHistoryService;
