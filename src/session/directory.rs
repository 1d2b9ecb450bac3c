//! ルームディレクトリと未読集計
//!
//! ## 責務
//!
//! - 所属ルーム一覧と非正規化プレビュー（最終メッセージ・時刻・件数）を保持
//! - フォーカス外ルームへの着信で未読数を加算し、フォーカス取得でリセット
//! - 一覧取得の状態機械 {idle, loading, loaded, error} を管理
//!
//! ## 設計ノート
//!
//! 一覧は常に最終メッセージ時刻の降順で返す。着信によるプレビュー更新は
//! ローカルで即時に反映し、再フェッチを待たない。未読数はクライアント
//! ローカルの概念であり、再フェッチしても失われない。

use std::collections::HashMap;

use crate::domain::{Room, RoomId, RoomLoadState, Timestamp};

/// `record_message` の結果
#[derive(Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// 既知のルーム。プレビュー（と必要なら未読数）を更新した
    Known,
    /// ディレクトリが知らないルーム。呼び出し側は再フェッチを行うべき
    Unknown,
}

/// 所属ルームの一覧・プレビュー・未読数
#[derive(Debug)]
pub struct RoomDirectory {
    rooms: Vec<Room>,
    unread: HashMap<RoomId, u32>,
    load_state: RoomLoadState,
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self {
            rooms: Vec::new(),
            unread: HashMap::new(),
            load_state: RoomLoadState::Idle,
        }
    }
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_state(&self) -> &RoomLoadState {
        &self.load_state
    }

    /// idle/loaded/error → loading. Returns `false` while a fetch is
    /// already in flight so concurrent refreshes collapse into one.
    pub fn begin_loading(&mut self) -> bool {
        if self.load_state == RoomLoadState::Loading {
            return false;
        }
        self.load_state = RoomLoadState::Loading;
        true
    }

    /// Apply a completed fetch. Unread counts survive the refresh.
    pub fn finish_loading(&mut self, rooms: Vec<Room>) {
        self.rooms = rooms;
        self.sort();
        self.load_state = RoomLoadState::Loaded;
    }

    /// Record a failed fetch; the reason is retryable, not fatal.
    pub fn fail_loading(&mut self, reason: impl Into<String>) {
        self.load_state = RoomLoadState::Error(reason.into());
    }

    /// Fold a single fetched room into the list (detail fetch for a room
    /// the directory did not know yet).
    pub fn upsert_room(&mut self, room: Room) {
        match self.rooms.iter_mut().find(|r| r.id == room.id) {
            Some(existing) => *existing = room,
            None => self.rooms.push(room),
        }
        self.sort();
    }

    /// Fold an inbound message into previews and unread counts.
    ///
    /// The caller decides whether the message counts as unread (it does not
    /// when the room is focused, or for the local user's own messages); the
    /// preview bumps either way.
    pub fn record_message(
        &mut self,
        room_id: &RoomId,
        preview_text: &str,
        at: Timestamp,
        count_unread: bool,
    ) -> RecordOutcome {
        if count_unread {
            *self.unread.entry(room_id.clone()).or_insert(0) += 1;
        }
        match self.rooms.iter_mut().find(|r| &r.id == room_id) {
            Some(room) => {
                room.bump_preview(preview_text, at);
                self.sort();
                RecordOutcome::Known
            }
            None => {
                tracing::debug!(%room_id, "message for room unknown to the directory");
                RecordOutcome::Unknown
            }
        }
    }

    /// Reset the unread count when a room gains focus
    pub fn reset_unread(&mut self, room_id: &RoomId) {
        self.unread.remove(room_id);
    }

    /// Rooms sorted by last-message time descending (most recent first)
    pub fn rooms(&self) -> Vec<Room> {
        self.rooms.clone()
    }

    pub fn unread_counts(&self) -> HashMap<RoomId, u32> {
        self.unread.clone()
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.iter().any(|r| &r.id == room_id)
    }

    fn sort(&mut self) {
        self.rooms.sort_by(|a, b| {
            b.preview
                .last_message_at
                .cmp(&a.preview.last_message_at)
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RoomKind, RoomPreview, UserId};

    fn room_with_preview(id: &str, last_message_at: Option<i64>) -> Room {
        let alice = UserId::new("alice").unwrap();
        let bob = UserId::new("bob").unwrap();
        Room::new(
            RoomId::new(id).unwrap(),
            RoomKind::Direct,
            None,
            vec![alice.clone(), bob],
            alice,
            Timestamp::new(0),
            RoomPreview {
                last_message: last_message_at.map(|_| "hi".to_string()),
                last_message_at: last_message_at.map(Timestamp::new),
                message_count: 0,
            },
        )
        .unwrap()
    }

    fn room_id(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    #[test]
    fn test_load_state_machine_happy_path() {
        // テスト項目: idle → loading → loaded の遷移
        // given (前提条件):
        let mut directory = RoomDirectory::new();
        assert_eq!(directory.load_state(), &RoomLoadState::Idle);

        // when (操作):
        assert!(directory.begin_loading());
        assert_eq!(directory.load_state(), &RoomLoadState::Loading);
        directory.finish_loading(vec![room_with_preview("r1", Some(100))]);

        // then (期待する結果):
        assert_eq!(directory.load_state(), &RoomLoadState::Loaded);
        assert_eq!(directory.rooms().len(), 1);
    }

    #[test]
    fn test_load_state_machine_error_path() {
        // テスト項目: loading → error の遷移と、error からの再試行
        // given (前提条件):
        let mut directory = RoomDirectory::new();
        directory.begin_loading();

        // when (操作):
        directory.fail_loading("service unavailable");

        // then (期待する結果): エラーは再試行可能な状態
        assert_eq!(
            directory.load_state(),
            &RoomLoadState::Error("service unavailable".to_string())
        );
        assert!(directory.begin_loading());
    }

    #[test]
    fn test_concurrent_loading_collapses() {
        // テスト項目: フェッチ中の再フェッチ要求が畳み込まれる
        // given (前提条件):
        let mut directory = RoomDirectory::new();
        assert!(directory.begin_loading());

        // when (操作):
        let second = directory.begin_loading();

        // then (期待する結果):
        assert!(!second);
    }

    #[test]
    fn test_rooms_sorted_by_last_message_desc() {
        // テスト項目: 一覧が最終メッセージ時刻の降順で返される
        // given (前提条件):
        let mut directory = RoomDirectory::new();
        directory.begin_loading();

        // when (操作):
        directory.finish_loading(vec![
            room_with_preview("r-old", Some(100)),
            room_with_preview("r-new", Some(300)),
            room_with_preview("r-mid", Some(200)),
            room_with_preview("r-empty", None),
        ]);

        // then (期待する結果): 新しい順、プレビューなしは末尾
        let ids: Vec<String> = directory
            .rooms()
            .iter()
            .map(|r| r.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["r-new", "r-mid", "r-old", "r-empty"]);
    }

    #[test]
    fn test_record_message_bumps_preview_and_resorts() {
        // テスト項目: 着信でプレビューが更新され、ルームが先頭に繰り上がる
        // given (前提条件):
        let mut directory = RoomDirectory::new();
        directory.finish_loading(vec![
            room_with_preview("r1", Some(100)),
            room_with_preview("r2", Some(200)),
        ]);

        // when (操作): 古い方のルームに新着
        let outcome = directory.record_message(&room_id("r1"), "fresh", Timestamp::new(900), true);

        // then (期待する結果):
        assert_eq!(outcome, RecordOutcome::Known);
        let rooms = directory.rooms();
        assert_eq!(rooms[0].id.as_str(), "r1");
        assert_eq!(rooms[0].preview.last_message.as_deref(), Some("fresh"));
        assert_eq!(rooms[0].preview.message_count, 1);
    }

    #[test]
    fn test_unread_increments_only_when_counted() {
        // テスト項目: 未読扱いの着信だけが未読数を増やす
        // given (前提条件):
        let mut directory = RoomDirectory::new();
        directory.finish_loading(vec![room_with_preview("r1", Some(100))]);

        // when (操作): 2 件は未読扱い、1 件はフォーカス中の着信
        directory.record_message(&room_id("r1"), "a", Timestamp::new(101), true);
        directory.record_message(&room_id("r1"), "b", Timestamp::new(102), true);
        directory.record_message(&room_id("r1"), "c", Timestamp::new(103), false);

        // then (期待する結果):
        assert_eq!(directory.unread_counts().get(&room_id("r1")), Some(&2));
    }

    #[test]
    fn test_reset_unread_on_focus() {
        // テスト項目: フォーカス取得で未読数が 0 に戻る
        // given (前提条件):
        let mut directory = RoomDirectory::new();
        directory.finish_loading(vec![room_with_preview("r1", Some(100))]);
        directory.record_message(&room_id("r1"), "a", Timestamp::new(101), true);

        // when (操作):
        directory.reset_unread(&room_id("r1"));

        // then (期待する結果):
        assert_eq!(directory.unread_counts().get(&room_id("r1")), None);
    }

    #[test]
    fn test_unread_counts_survive_refresh() {
        // テスト項目: 再フェッチしても未読数が維持される
        // given (前提条件):
        let mut directory = RoomDirectory::new();
        directory.finish_loading(vec![room_with_preview("r1", Some(100))]);
        directory.record_message(&room_id("r1"), "a", Timestamp::new(101), true);

        // when (操作): 再フェッチが完了する
        directory.begin_loading();
        directory.finish_loading(vec![room_with_preview("r1", Some(101))]);

        // then (期待する結果):
        assert_eq!(directory.unread_counts().get(&room_id("r1")), Some(&1));
    }

    #[test]
    fn test_record_message_for_unknown_room() {
        // テスト項目: 未知ルームへの着信が Unknown を返し再フェッチを促す
        // given (前提条件):
        let mut directory = RoomDirectory::new();

        // when (操作):
        let outcome =
            directory.record_message(&room_id("r-new"), "hello", Timestamp::new(1), true);

        // then (期待する結果): 未読は数えられている（ルームが後から現れても失わない）
        assert_eq!(outcome, RecordOutcome::Unknown);
        assert_eq!(directory.unread_counts().get(&room_id("r-new")), Some(&1));
    }

    #[test]
    fn test_upsert_room_inserts_and_replaces() {
        // テスト項目: 単発フェッチの結果が一覧に挿入・置換される
        // given (前提条件):
        let mut directory = RoomDirectory::new();
        directory.upsert_room(room_with_preview("r1", Some(100)));
        assert_eq!(directory.rooms().len(), 1);

        // when (操作): 同じルームの新しい詳細で置換する
        directory.upsert_room(room_with_preview("r1", Some(500)));

        // then (期待する結果):
        let rooms = directory.rooms();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].preview.last_message_at, Some(Timestamp::new(500)));
    }
}
