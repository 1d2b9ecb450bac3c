//! コマンド・イベントの閉じた型定義
//!
//! ## 設計ノート
//!
//! トランスポート上を流れるコマンドとイベントを閉じたタグ付き列挙型で
//! 表現します。受信側のディスパッチは match で網羅され、キーの有無に
//! 依存する実行時分岐は存在しません。
//!
//! コマンドの完了はサーバの `ack` イベントで通知され、クライアントが
//! 発行する相関 ID（`CorrelationId`）で突き合わせます。

use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use super::entity::{ChatMessage, Room, TypingIndicator};
use super::error::ValidationError;
use super::value_object::{ImageRef, MessageBody, MessageId, RoomId, UserId};

/// Transport status as observed by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Handshake or connection failure with a human-readable reason.
    /// The client keeps retrying in the background while in this state.
    Error(String),
}

/// Client-generated id correlating a command with its server `ack`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|e| ValidationError::Malformed {
                field: "correlation id",
                reason: e.to_string(),
            })
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Commands the client sends to the messaging server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Associate the connection with an identity (handshake)
    Register { user_id: UserId },
    /// Subscribe to a room's broadcasts
    JoinRoom {
        correlation_id: CorrelationId,
        room_id: RoomId,
    },
    /// Unsubscribe from a room
    LeaveRoom { room_id: RoomId },
    /// Submit a new message
    SendMessage {
        correlation_id: CorrelationId,
        room_id: RoomId,
        body: MessageBody,
        image: Option<ImageRef>,
    },
    /// Mutate an existing message
    EditMessage {
        correlation_id: CorrelationId,
        room_id: RoomId,
        message_id: MessageId,
        new_body: MessageBody,
    },
    /// Tombstone an existing message
    DeleteMessage {
        correlation_id: CorrelationId,
        room_id: RoomId,
        message_id: MessageId,
    },
    /// Presence signal
    Typing { room_id: RoomId, is_typing: bool },
}

/// Result carried by a server `ack`
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// Command accepted; sends carry the confirmed message with its
    /// server-assigned id
    Accepted { message: Option<ChatMessage> },
    /// Command rejected (permission denied, room not found, ...)
    Rejected { reason: String },
}

/// Events the messaging server pushes to the client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Broadcast to room members, including the sender's own echo
    NewMessage(ChatMessage),
    MessageEdited {
        room_id: RoomId,
        message_id: MessageId,
        new_body: MessageBody,
    },
    MessageDeleted {
        room_id: RoomId,
        message_id: MessageId,
    },
    UserTyping(TypingIndicator),
    /// Direct response to a correlated command
    Ack {
        in_reply_to: CorrelationId,
        outcome: AckOutcome,
    },
}

/// A user currently typing in a room, as exposed to projections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Typist {
    pub user_id: UserId,
    pub display_name: String,
}

/// Message-collection change notifications for UI observers
#[derive(Debug, Clone, PartialEq)]
pub enum MessageEvent {
    New {
        room_id: RoomId,
        message: ChatMessage,
    },
    Edited {
        room_id: RoomId,
        message_id: MessageId,
        new_body: MessageBody,
    },
    Deleted {
        room_id: RoomId,
        message_id: MessageId,
    },
    /// The room's backfill from the history service completed; observers
    /// should re-read the snapshot
    HistoryLoaded { room_id: RoomId },
}

/// Typing-presence change notification (full per-room snapshot)
#[derive(Debug, Clone, PartialEq)]
pub struct TypingEvent {
    pub room_id: RoomId,
    pub typists: Vec<Typist>,
}

/// Room-list loading state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomLoadState {
    Idle,
    Loading,
    Loaded,
    /// Load failed; carries a retryable reason, not a fatal abort
    Error(String),
}

/// Room-directory change notifications
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryEvent {
    LoadStateChanged(RoomLoadState),
    RoomsUpdated {
        /// Rooms sorted by last-message time descending
        rooms: Vec<Room>,
        unread: HashMap<RoomId, u32>,
    },
}
