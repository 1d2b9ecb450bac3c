//! WebSocket wire envelopes.
//!
//! Every frame is a JSON object whose `type` field selects the variant, so
//! parsing yields a closed set of cases and unknown frames fail loudly at
//! the decode boundary instead of deep in the dispatch.

use serde::{Deserialize, Serialize};

/// Message payload shared by realtime events and the history API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Server-assigned Unix timestamp (milliseconds)
    pub sent_at: i64,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub deleted: bool,
}

/// Client → server frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WireCommand {
    /// Associate the connection with an identity
    Register { user_id: String },
    JoinRoom {
        correlation_id: String,
        room_id: String,
    },
    LeaveRoom { room_id: String },
    SendMessage {
        correlation_id: String,
        room_id: String,
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },
    EditMessage {
        correlation_id: String,
        room_id: String,
        message_id: String,
        new_body: String,
    },
    DeleteMessage {
        correlation_id: String,
        room_id: String,
        message_id: String,
    },
    Typing { room_id: String, is_typing: bool },
}

/// Acknowledgment status (server → client)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "error")]
    Error,
}

/// Server → client frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WireEvent {
    NewMessage { message: MessageDto },
    MessageEdited {
        room_id: String,
        message_id: String,
        new_body: String,
    },
    MessageDeleted {
        room_id: String,
        message_id: String,
    },
    UserTyping {
        room_id: String,
        user_id: String,
        display_name: String,
        is_typing: bool,
    },
    /// Response to a correlated command, idempotent on redelivery
    Ack {
        in_reply_to: String,
        status: AckStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<MessageDto>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_command_serializes_with_kebab_case_tag() {
        // テスト項目: コマンドが type タグつき JSON に直列化される
        // given (前提条件):
        let command = WireCommand::JoinRoom {
            correlation_id: "c-1".to_string(),
            room_id: "room-1".to_string(),
        };

        // when (操作):
        let json = serde_json::to_value(&command).unwrap();

        // then (期待する結果):
        assert_eq!(json["type"], "join-room");
        assert_eq!(json["correlationId"], "c-1");
        assert_eq!(json["roomId"], "room-1");
    }

    #[test]
    fn test_wire_event_deserializes_new_message() {
        // テスト項目: new-message イベントが変換される
        // given (前提条件):
        let json = r#"{
            "type": "new-message",
            "message": {
                "id": "msg-42",
                "roomId": "room-1",
                "senderId": "u9",
                "senderName": "Alice",
                "body": "Hello",
                "sentAt": 1000
            }
        }"#;

        // when (操作):
        let event: WireEvent = serde_json::from_str(json).unwrap();

        // then (期待する結果): 省略されたフラグは既定値
        let WireEvent::NewMessage { message } = event else {
            panic!("expected new-message");
        };
        assert_eq!(message.id, "msg-42");
        assert_eq!(message.image_url, None);
        assert!(!message.edited);
        assert!(!message.deleted);
    }

    #[test]
    fn test_wire_event_deserializes_ack_error() {
        // テスト項目: 失敗 ack が status と理由つきで変換される
        // given (前提条件):
        let json = r#"{
            "type": "ack",
            "inReplyTo": "2f1f8c9e-5b0a-4d4e-9d44-0a9e15b7f001",
            "status": "error",
            "error": "room not found"
        }"#;

        // when (操作):
        let event: WireEvent = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        let WireEvent::Ack { status, error, message, .. } = event else {
            panic!("expected ack");
        };
        assert_eq!(status, AckStatus::Error);
        assert_eq!(error.as_deref(), Some("room not found"));
        assert_eq!(message, None);
    }

    #[test]
    fn test_unknown_frame_type_fails_to_decode() {
        // テスト項目: 未知の type を持つフレームがデコード境界で拒否される
        // given (前提条件):
        let json = r#"{"type": "presence-sync", "roomId": "r"}"#;

        // when (操作):
        let result: Result<WireEvent, _> = serde_json::from_str(json);

        // then (期待する結果):
        assert!(result.is_err());
    }
}
