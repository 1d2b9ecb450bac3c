//! ドメイン層のエンティティ定義
//!
//! ## 責務
//!
//! - `ChatMessage`: ルーム内の 1 発言。サーバ発行 ID で同一性を判定し、
//!   編集・削除はフラグによる一方向の状態遷移として表現します。
//! - `Room`: 会話スコープ。参加者リストと、ルーム一覧表示用に
//!   非正規化されたプレビュー情報を保持します。
//! - `TypingIndicator`: 永続化されない入力中シグナル。

use super::error::ValidationError;
use super::value_object::{ImageRef, MessageBody, MessageId, RoomId, Timestamp, UserId};

/// A single chat utterance within a room.
///
/// Identity is the server-assigned `id`; once assigned it never changes.
/// Deletion is a tombstone: the entry stays in place with `deleted` set so
/// ordering and other participants' views are preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    /// Sender display name, denormalized at send time
    pub sender_name: String,
    pub body: MessageBody,
    pub image: Option<ImageRef>,
    /// Authoritative server timestamp
    pub sent_at: Timestamp,
    pub edited: bool,
    pub deleted: bool,
}

impl ChatMessage {
    pub fn new(
        id: MessageId,
        room_id: RoomId,
        sender_id: UserId,
        sender_name: impl Into<String>,
        body: MessageBody,
        image: Option<ImageRef>,
        sent_at: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id,
            sender_name: sender_name.into(),
            body,
            image,
            sent_at,
            edited: false,
            deleted: false,
        }
    }

    /// Replace the body and mark the message as edited.
    pub fn apply_edit(&mut self, new_body: MessageBody) {
        self.body = new_body;
        self.edited = true;
    }

    /// Mark the message as deleted. The body is retained as a tombstone;
    /// projections must render a placeholder from the flag.
    pub fn tombstone(&mut self) {
        self.deleted = true;
    }
}

/// Conversation type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomKind {
    Direct,
    Group,
}

/// ルーム一覧表示用の非正規化プレビュー
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoomPreview {
    pub last_message: Option<String>,
    pub last_message_at: Option<Timestamp>,
    pub message_count: u64,
}

/// A conversation scope.
///
/// Direct rooms have exactly two distinct participants and the list is
/// immutable after creation; group membership may change out-of-band and is
/// taken as-is from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: RoomId,
    pub kind: RoomKind,
    pub name: Option<String>,
    pub participants: Vec<UserId>,
    pub created_by: UserId,
    pub created_at: Timestamp,
    pub preview: RoomPreview,
}

impl Room {
    pub fn new(
        id: RoomId,
        kind: RoomKind,
        name: Option<String>,
        participants: Vec<UserId>,
        created_by: UserId,
        created_at: Timestamp,
        preview: RoomPreview,
    ) -> Result<Self, ValidationError> {
        if participants.is_empty() {
            return Err(ValidationError::Empty("participant list"));
        }
        if kind == RoomKind::Direct
            && (participants.len() != 2 || participants[0] == participants[1])
        {
            return Err(ValidationError::DirectRoomArity);
        }
        Ok(Self {
            id,
            kind,
            name,
            participants,
            created_by,
            created_at,
            preview,
        })
    }

    /// Update the denormalized preview for a newly observed message.
    pub fn bump_preview(&mut self, last_message: impl Into<String>, at: Timestamp) {
        self.preview.last_message = Some(last_message.into());
        self.preview.last_message_at = Some(at);
        self.preview.message_count += 1;
    }
}

/// Ephemeral typing-presence signal for one (room, user) pair.
///
/// Never persisted; carries a display name so the UI can render
/// "X, Y typing…" without a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct TypingIndicator {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub display_name: String,
    pub is_typing: bool,
}
