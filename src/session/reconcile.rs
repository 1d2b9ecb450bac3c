//! メッセージ照合エンジン
//!
//! ## 責務
//!
//! メッセージは 2 つの独立した経路で到着します：
//!
//! - 自分の送信コマンドへの直接応答（ack）
//! - ルームメンバー全員（送信者自身を含む）へのブロードキャスト
//!
//! 素朴な実装では自分のメッセージが二重に追加されます。このエンジンは
//! ルームごとの正規コレクションを唯一の所有者として保持し、サーバ発行
//! ID で重複排除しながら到着順を保ちます。
//!
//! ## 設計ノート
//!
//! - 並び順はサーバ到着順そのもの。クライアント側での再ソートは行わない。
//! - 編集・削除はその場での変異。削除は墓碑であり、エントリを取り除かない。
//! - ルーム履歴は無制限に伸びるため、ID からの検索は添字マップで O(1)。

use std::collections::HashMap;

use crate::domain::{ChatMessage, MessageBody, MessageId};

/// 1 ルーム分の正規メッセージコレクション
///
/// 到着順の `Vec` と、ID から添字への索引を併せ持つ。UI は
/// [`RoomMessages::snapshot`] の読み取り専用コピーのみを受け取る。
#[derive(Debug, Default)]
pub struct RoomMessages {
    entries: Vec<ChatMessage>,
    index: HashMap<MessageId, usize>,
}

impl RoomMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message observed from any delivery path.
    ///
    /// Returns `false` when the id is already present (duplicate delivery,
    /// e.g. the broadcast echo of an already-acked send); the existing entry
    /// is left untouched and nothing is reordered.
    pub fn insert(&mut self, message: ChatMessage) -> bool {
        if self.index.contains_key(&message.id) {
            tracing::debug!(
                message_id = %message.id,
                "duplicate delivery discarded"
            );
            return false;
        }
        self.index.insert(message.id.clone(), self.entries.len());
        self.entries.push(message);
        true
    }

    /// Mutate a message body in place and set its edited flag.
    ///
    /// Returns `false` when the id is not locally present (out-of-order
    /// delivery); the mutation is discarded, a later history fetch carries
    /// the server-authoritative state.
    pub fn edit(&mut self, message_id: &MessageId, new_body: MessageBody) -> bool {
        match self.index.get(message_id) {
            Some(&pos) => {
                self.entries[pos].apply_edit(new_body);
                true
            }
            None => {
                tracing::debug!(%message_id, "edit for unknown message discarded");
                false
            }
        }
    }

    /// Set the deleted flag in place. The entry keeps its slot so ordering
    /// and ids stay stable for every participant's view.
    pub fn tombstone(&mut self, message_id: &MessageId) -> bool {
        match self.index.get(message_id) {
            Some(&pos) => {
                self.entries[pos].tombstone();
                true
            }
            None => {
                tracing::debug!(%message_id, "delete for unknown message discarded");
                false
            }
        }
    }

    /// Replace the collection with a history backfill, preserving any live
    /// entries the backfill does not know about yet.
    ///
    /// The history order is authoritative; live messages that raced ahead of
    /// the fetch are re-appended behind it in their original relative order,
    /// deduplicated by id.
    pub fn hydrate(&mut self, history: Vec<ChatMessage>) {
        let mut merged = Self::new();
        for message in history {
            merged.insert(message);
        }
        for message in self.entries.drain(..) {
            merged.insert(message);
        }
        *self = merged;
    }

    pub fn get(&self, message_id: &MessageId) -> Option<&ChatMessage> {
        self.index.get(message_id).map(|&pos| &self.entries[pos])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only copy for UI projections
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.clone()
    }
}
