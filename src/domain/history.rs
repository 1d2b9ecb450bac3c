//! HistoryService trait 定義
//!
//! リアルタイムトランスポートはライブイベントのみを運ぶため、
//! 初期表示・バックフィルは REST の履歴サービスから取得します。
//! ドメイン層がインターフェースを定義し、Infrastructure 層が
//! 実装を提供します（依存性の逆転）。

use async_trait::async_trait;

use super::entity::{ChatMessage, Room};
use super::error::HistoryError;
use super::value_object::{RoomId, UserId};

/// 履歴サービスへのインターフェース
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryService: Send + Sync {
    /// ユーザが所属するルーム一覧をプレビュー付きで取得
    async fn fetch_rooms(&self, user_id: &UserId) -> Result<Vec<Room>, HistoryError>;

    /// ルームのメッセージ履歴をサーバ到着順で取得
    async fn fetch_messages(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, HistoryError>;

    /// 単一ルームの詳細を取得
    async fn fetch_room(&self, room_id: &RoomId) -> Result<Room, HistoryError>;
}
