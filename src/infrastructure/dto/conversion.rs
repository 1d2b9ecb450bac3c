//! Conversion logic between DTOs and domain types.
//!
//! Inbound conversions validate; a malformed payload surfaces as a
//! `ValidationError` at the decode boundary, where the caller logs and
//! drops the frame instead of crashing.

use crate::domain::{
    AckOutcome, ChatMessage, ClientCommand, CorrelationId, ImageRef, MessageBody, MessageId, Room,
    RoomId, RoomKind, RoomPreview, ServerEvent, Timestamp, TypingIndicator, UserId,
    ValidationError,
};
use crate::infrastructure::dto::http::RoomDto;
use crate::infrastructure::dto::websocket as dto;

// ========================================
// DTO → Domain
// ========================================

impl TryFrom<dto::MessageDto> for ChatMessage {
    type Error = ValidationError;

    fn try_from(dto: dto::MessageDto) -> Result<Self, Self::Error> {
        // Whether the backend clears tombstoned bodies is unspecified;
        // tolerate an empty body on deleted messages so the entry keeps its
        // slot (projections render from the flag, not the body).
        let body = match MessageBody::new(dto.body) {
            Ok(body) => body,
            Err(_) if dto.deleted => MessageBody::new("(deleted)")?,
            Err(e) => return Err(e),
        };
        let mut message = ChatMessage::new(
            MessageId::new(dto.id)?,
            RoomId::new(dto.room_id)?,
            UserId::new(dto.sender_id)?,
            dto.sender_name,
            body,
            dto.image_url.map(ImageRef::new).transpose()?,
            Timestamp::new(dto.sent_at),
        );
        message.edited = dto.edited;
        message.deleted = dto.deleted;
        Ok(message)
    }
}

impl TryFrom<RoomDto> for Room {
    type Error = ValidationError;

    fn try_from(dto: RoomDto) -> Result<Self, Self::Error> {
        let kind = match dto.kind.as_str() {
            "direct" => RoomKind::Direct,
            "group" => RoomKind::Group,
            other => {
                return Err(ValidationError::Malformed {
                    field: "room kind",
                    reason: format!("unknown kind '{}'", other),
                });
            }
        };
        let participants = dto
            .participants
            .into_iter()
            .map(UserId::new)
            .collect::<Result<Vec<_>, _>>()?;
        Room::new(
            RoomId::new(dto.id)?,
            kind,
            dto.name,
            participants,
            UserId::new(dto.created_by)?,
            Timestamp::new(dto.created_at),
            RoomPreview {
                last_message: dto.last_message,
                last_message_at: dto.last_message_at.map(Timestamp::new),
                message_count: dto.message_count,
            },
        )
    }
}

impl TryFrom<dto::WireEvent> for ServerEvent {
    type Error = ValidationError;

    fn try_from(event: dto::WireEvent) -> Result<Self, Self::Error> {
        Ok(match event {
            dto::WireEvent::NewMessage { message } => {
                ServerEvent::NewMessage(ChatMessage::try_from(message)?)
            }
            dto::WireEvent::MessageEdited {
                room_id,
                message_id,
                new_body,
            } => ServerEvent::MessageEdited {
                room_id: RoomId::new(room_id)?,
                message_id: MessageId::new(message_id)?,
                new_body: MessageBody::new(new_body)?,
            },
            dto::WireEvent::MessageDeleted {
                room_id,
                message_id,
            } => ServerEvent::MessageDeleted {
                room_id: RoomId::new(room_id)?,
                message_id: MessageId::new(message_id)?,
            },
            dto::WireEvent::UserTyping {
                room_id,
                user_id,
                display_name,
                is_typing,
            } => ServerEvent::UserTyping(TypingIndicator {
                room_id: RoomId::new(room_id)?,
                user_id: UserId::new(user_id)?,
                display_name,
                is_typing,
            }),
            dto::WireEvent::Ack {
                in_reply_to,
                status,
                message,
                error,
            } => ServerEvent::Ack {
                in_reply_to: CorrelationId::parse(&in_reply_to)?,
                outcome: match status {
                    dto::AckStatus::Ok => AckOutcome::Accepted {
                        message: message.map(ChatMessage::try_from).transpose()?,
                    },
                    dto::AckStatus::Error => AckOutcome::Rejected {
                        reason: error.unwrap_or_else(|| "unspecified server error".to_string()),
                    },
                },
            },
        })
    }
}

// ========================================
// Domain → DTO
// ========================================

impl From<ChatMessage> for dto::MessageDto {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id.into_string(),
            room_id: message.room_id.into_string(),
            sender_id: message.sender_id.into_string(),
            sender_name: message.sender_name,
            body: message.body.into_string(),
            image_url: message.image.map(ImageRef::into_string),
            sent_at: message.sent_at.value(),
            edited: message.edited,
            deleted: message.deleted,
        }
    }
}

impl From<ClientCommand> for dto::WireCommand {
    fn from(command: ClientCommand) -> Self {
        match command {
            ClientCommand::Register { user_id } => dto::WireCommand::Register {
                user_id: user_id.into_string(),
            },
            ClientCommand::JoinRoom {
                correlation_id,
                room_id,
            } => dto::WireCommand::JoinRoom {
                correlation_id: correlation_id.to_string(),
                room_id: room_id.into_string(),
            },
            ClientCommand::LeaveRoom { room_id } => dto::WireCommand::LeaveRoom {
                room_id: room_id.into_string(),
            },
            ClientCommand::SendMessage {
                correlation_id,
                room_id,
                body,
                image,
            } => dto::WireCommand::SendMessage {
                correlation_id: correlation_id.to_string(),
                room_id: room_id.into_string(),
                body: body.into_string(),
                image_url: image.map(ImageRef::into_string),
            },
            ClientCommand::EditMessage {
                correlation_id,
                room_id,
                message_id,
                new_body,
            } => dto::WireCommand::EditMessage {
                correlation_id: correlation_id.to_string(),
                room_id: room_id.into_string(),
                message_id: message_id.into_string(),
                new_body: new_body.into_string(),
            },
            ClientCommand::DeleteMessage {
                correlation_id,
                room_id,
                message_id,
            } => dto::WireCommand::DeleteMessage {
                correlation_id: correlation_id.to_string(),
                room_id: room_id.into_string(),
                message_id: message_id.into_string(),
            },
            ClientCommand::Typing { room_id, is_typing } => dto::WireCommand::Typing {
                room_id: room_id.into_string(),
                is_typing,
            },
        }
    }
}
