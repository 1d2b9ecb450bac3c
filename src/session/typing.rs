//! 入力中プレゼンス追跡
//!
//! ## 責務
//!
//! - (ルーム, ユーザ) ごとの「入力中」状態を保持する
//! - `is_typing = true` に自動失効タイマーを張り、新しいイベントで
//!   キャンセル・張り替えする（cancel-and-replace）
//! - 送信側のバースト（キーストロークごとの呼び出し）を窓内で
//!   合流させ、トランスポートを溢れさせない
//!
//! ## 設計ノート
//!
//! タイマーは直接状態を触らない。満了は世代番号付きイベントとして
//! イベントループの単一キューに投函され、世代が一致したときだけ
//! エントリを消す。これにより満了と「stop typing」イベントの競合は
//! キュー順で決まり、遅れて届いた方は安全な no-op になる。

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::{RoomId, TypingIndicator, Typist, UserId};

use super::client::LoopEvent;

/// 入力中表示の自動失効までの時間
pub(crate) const TYPING_EXPIRY: Duration = Duration::from_secs(3);

/// 同値の typing シグナルを再送しない窓（ミリ秒）
pub(crate) const TYPING_THROTTLE_MILLIS: i64 = 300;

#[derive(Debug)]
struct TypistEntry {
    display_name: String,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
struct LastSent {
    value: bool,
    at_millis: i64,
}

/// ルームごと・ユーザごとの入力中状態
pub(crate) struct TypingTracker {
    loop_tx: mpsc::UnboundedSender<LoopEvent>,
    expiry: Duration,
    throttle_millis: i64,
    typists: HashMap<RoomId, HashMap<UserId, TypistEntry>>,
    last_sent: HashMap<RoomId, LastSent>,
    next_generation: u64,
}

impl TypingTracker {
    pub fn new(
        loop_tx: mpsc::UnboundedSender<LoopEvent>,
        expiry: Duration,
        throttle_millis: i64,
    ) -> Self {
        Self {
            loop_tx,
            expiry,
            throttle_millis,
            typists: HashMap::new(),
            last_sent: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Apply an inbound typing indicator.
    ///
    /// Returns `true` when the visible typist set of the room changed (a new
    /// typist appeared or one was cleared); a refresh of an existing typist
    /// only resets its expiry timer.
    pub fn observe(&mut self, indicator: &TypingIndicator) -> bool {
        if indicator.is_typing {
            self.next_generation += 1;
            let generation = self.next_generation;
            let timer = self.spawn_expiry(
                indicator.room_id.clone(),
                indicator.user_id.clone(),
                generation,
            );
            let entry = TypistEntry {
                display_name: indicator.display_name.clone(),
                generation,
                timer,
            };
            let previous = self
                .typists
                .entry(indicator.room_id.clone())
                .or_default()
                .insert(indicator.user_id.clone(), entry);
            match previous {
                Some(old) => {
                    old.timer.abort();
                    false
                }
                None => true,
            }
        } else {
            self.remove(&indicator.room_id, &indicator.user_id)
        }
    }

    /// Handle a queued expiry event. Removes the entry only when the
    /// generation matches; a stale expiry (the timer was superseded before
    /// its event was processed) is a safe no-op.
    pub fn expire(&mut self, room_id: &RoomId, user_id: &UserId, generation: u64) -> bool {
        let Some(room) = self.typists.get_mut(room_id) else {
            return false;
        };
        let matches = room
            .get(user_id)
            .is_some_and(|entry| entry.generation == generation);
        if !matches {
            return false;
        }
        room.remove(user_id);
        if room.is_empty() {
            self.typists.remove(room_id);
        }
        true
    }

    /// Drop all typing state for a room and cancel its pending timers.
    /// Returns `true` when any typist was visible.
    pub fn clear_room(&mut self, room_id: &RoomId) -> bool {
        match self.typists.remove(room_id) {
            Some(entries) => {
                for entry in entries.values() {
                    entry.timer.abort();
                }
                self.last_sent.remove(room_id);
                !entries.is_empty()
            }
            None => {
                self.last_sent.remove(room_id);
                false
            }
        }
    }

    /// Cancel every pending timer (session shutdown)
    pub fn clear_all(&mut self) {
        for entries in self.typists.values() {
            for entry in entries.values() {
                entry.timer.abort();
            }
        }
        self.typists.clear();
        self.last_sent.clear();
    }

    /// Current typists of a room, sorted for stable display
    pub fn typists(&self, room_id: &RoomId) -> Vec<Typist> {
        let mut typists: Vec<Typist> = self
            .typists
            .get(room_id)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(user_id, entry)| Typist {
                        user_id: user_id.clone(),
                        display_name: entry.display_name.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        typists.sort_by(|a, b| {
            a.display_name
                .cmp(&b.display_name)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        typists
    }

    /// Decide whether an outbound typing signal should reach the wire.
    ///
    /// A value change is always transmitted; an unchanged value is
    /// retransmitted only after the throttle window, so keystroke bursts
    /// collapse to one frame per window.
    pub fn should_send(&mut self, room_id: &RoomId, is_typing: bool, now_millis: i64) -> bool {
        let send = match self.last_sent.get(room_id) {
            Some(last) => {
                last.value != is_typing || now_millis - last.at_millis >= self.throttle_millis
            }
            None => true,
        };
        if send {
            self.last_sent.insert(
                room_id.clone(),
                LastSent {
                    value: is_typing,
                    at_millis: now_millis,
                },
            );
        }
        send
    }

    fn remove(&mut self, room_id: &RoomId, user_id: &UserId) -> bool {
        let Some(room) = self.typists.get_mut(room_id) else {
            return false;
        };
        let removed = room.remove(user_id);
        if let Some(entry) = &removed {
            entry.timer.abort();
        }
        if room.is_empty() {
            self.typists.remove(room_id);
        }
        removed.is_some()
    }

    fn spawn_expiry(&self, room_id: RoomId, user_id: UserId, generation: u64) -> JoinHandle<()> {
        let tx = self.loop_tx.clone();
        let expiry = self.expiry;
        tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            let _ = tx.send(LoopEvent::TypingExpired {
                room_id,
                user_id,
                generation,
            });
        })
    }
}
