//! ルームメンバーシップ追跡
//!
//! ## 責務
//!
//! - 参加中ルームの集合（望ましい状態）を追跡する
//! - 重複 join をガードし、画面の再入でコマンドが二重発行されないようにする
//! - 「現在フォーカス中」のルームを保持し、引数なし leave の対象にする
//!
//! ## 設計ノート
//!
//! サーバ側のルーム購読は一時的な接続に紐づき、再接続後は保証されない。
//! そのためこの集合は再接続のたびに join 順でそのまま再送される。
//! オフライン中の join / leave はこの集合だけを変異させるので、
//! 電線に乗る前に相殺される組は自然に no-op に畳み込まれる。

use crate::domain::RoomId;

/// 参加中ルームの望ましい状態
#[derive(Debug, Default)]
pub struct RoomMembership {
    /// Joined rooms in issuance order; replayed verbatim after reconnect
    active: Vec<RoomId>,
    /// The room the foreground UI currently shows
    focused: Option<RoomId>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a room as joined. Returns `false` when already active, in which
    /// case no join command must be issued.
    pub fn join(&mut self, room_id: RoomId) -> bool {
        if self.is_active(&room_id) {
            return false;
        }
        self.active.push(room_id);
        true
    }

    /// Remove a room from the active set. Returns `false` when the room was
    /// not active (leave is then a no-op).
    pub fn leave(&mut self, room_id: &RoomId) -> bool {
        let before = self.active.len();
        self.active.retain(|id| id != room_id);
        if self.focused.as_ref() == Some(room_id) {
            self.focused = None;
        }
        self.active.len() != before
    }

    pub fn is_active(&self, room_id: &RoomId) -> bool {
        self.active.iter().any(|id| id == room_id)
    }

    /// Rooms to re-join after a successful (re)connect, in issuance order
    pub fn replay_order(&self) -> &[RoomId] {
        &self.active
    }

    pub fn set_focus(&mut self, room_id: RoomId) {
        self.focused = Some(room_id);
    }

    pub fn focused(&self) -> Option<&RoomId> {
        self.focused.as_ref()
    }

    pub fn is_focused(&self, room_id: &RoomId) -> bool {
        self.focused.as_ref() == Some(room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    #[test]
    fn test_join_marks_room_active() {
        // テスト項目: join でルームが参加中になる
        // given (前提条件):
        let mut membership = RoomMembership::new();

        // when (操作):
        let newly = membership.join(room("r1"));

        // then (期待する結果):
        assert!(newly);
        assert!(membership.is_active(&room("r1")));
    }

    #[test]
    fn test_duplicate_join_is_guarded() {
        // テスト項目: 同じルームへの再 join が false を返しコマンド二重発行を防ぐ
        // given (前提条件):
        let mut membership = RoomMembership::new();
        membership.join(room("r1"));

        // when (操作): 画面再入などで再度 join される
        let newly = membership.join(room("r1"));

        // then (期待する結果):
        assert!(!newly);
        assert_eq!(membership.replay_order().len(), 1);
    }

    #[test]
    fn test_leave_removes_room() {
        // テスト項目: leave で参加中ルームから外れる
        // given (前提条件):
        let mut membership = RoomMembership::new();
        membership.join(room("r1"));

        // when (操作):
        let was_active = membership.leave(&room("r1"));

        // then (期待する結果):
        assert!(was_active);
        assert!(!membership.is_active(&room("r1")));
    }

    #[test]
    fn test_leave_inactive_room_is_noop() {
        // テスト項目: 参加していないルームへの leave は no-op
        // given (前提条件):
        let mut membership = RoomMembership::new();

        // when (操作):
        let was_active = membership.leave(&room("r9"));

        // then (期待する結果):
        assert!(!was_active);
    }

    #[test]
    fn test_replay_order_matches_issuance_order() {
        // テスト項目: 再接続時の再送順が join の発行順と一致する
        // given (前提条件):
        let mut membership = RoomMembership::new();

        // when (操作):
        membership.join(room("r2"));
        membership.join(room("r1"));
        membership.join(room("r3"));

        // then (期待する結果):
        let order: Vec<&str> = membership
            .replay_order()
            .iter()
            .map(|id| id.as_str())
            .collect();
        assert_eq!(order, vec!["r2", "r1", "r3"]);
    }

    #[test]
    fn test_offline_join_then_leave_collapses_to_noop() {
        // テスト項目: 電線に乗る前の join→leave の組が再送集合から消える
        // given (前提条件): オフライン中
        let mut membership = RoomMembership::new();
        membership.join(room("r1"));
        membership.join(room("r2"));

        // when (操作): r2 を電線に乗せる前に離脱する
        membership.leave(&room("r2"));

        // then (期待する結果): 再送されるのは r1 のみ
        let order: Vec<&str> = membership
            .replay_order()
            .iter()
            .map(|id| id.as_str())
            .collect();
        assert_eq!(order, vec!["r1"]);
    }

    #[test]
    fn test_focus_follows_join_and_clears_on_leave() {
        // テスト項目: フォーカスの設定と、対象ルーム離脱時の解除
        // given (前提条件):
        let mut membership = RoomMembership::new();
        membership.join(room("r1"));
        membership.set_focus(room("r1"));
        assert!(membership.is_focused(&room("r1")));

        // when (操作):
        membership.leave(&room("r1"));

        // then (期待する結果):
        assert_eq!(membership.focused(), None);
    }

    #[test]
    fn test_leaving_other_room_keeps_focus() {
        // テスト項目: フォーカス外のルームを離脱してもフォーカスは維持される
        // given (前提条件):
        let mut membership = RoomMembership::new();
        membership.join(room("r1"));
        membership.join(room("r2"));
        membership.set_focus(room("r2"));

        // when (操作):
        membership.leave(&room("r1"));

        // then (期待する結果):
        assert!(membership.is_focused(&room("r2")));
    }
}
