//! Event stream fan-out.
//!
//! Exposes the client's state changes as independently subscribable
//! sequences. Each subscriber gets its own broadcast receiver; delivery is
//! order-preserving per subscriber and a slow or absent subscriber never
//! blocks the event loop.

use tokio::sync::broadcast;

use crate::domain::{ConnectionState, DirectoryEvent, MessageEvent, TypingEvent};

/// Buffered events per subscriber before the oldest are dropped
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Fan-out hub for the four event families
#[derive(Clone)]
pub struct EventBus {
    messages: broadcast::Sender<MessageEvent>,
    typing: broadcast::Sender<TypingEvent>,
    connection: broadcast::Sender<ConnectionState>,
    directory: broadcast::Sender<DirectoryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (messages, _) = broadcast::channel(capacity);
        let (typing, _) = broadcast::channel(capacity);
        let (connection, _) = broadcast::channel(capacity);
        let (directory, _) = broadcast::channel(capacity);
        Self {
            messages,
            typing,
            connection,
            directory,
        }
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<MessageEvent> {
        self.messages.subscribe()
    }

    pub fn subscribe_typing(&self) -> broadcast::Receiver<TypingEvent> {
        self.typing.subscribe()
    }

    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn subscribe_directory(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.directory.subscribe()
    }

    // Publishing without subscribers is not an error; the send result is
    // intentionally ignored.

    pub(crate) fn publish_message(&self, event: MessageEvent) {
        let _ = self.messages.send(event);
    }

    pub(crate) fn publish_typing(&self, event: TypingEvent) {
        let _ = self.typing.send(event);
    }

    pub(crate) fn publish_connection(&self, state: ConnectionState) {
        let _ = self.connection.send(state);
    }

    pub(crate) fn publish_directory(&self, event: DirectoryEvent) {
        let _ = self.directory.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RoomId, Typist, UserId};

    #[tokio::test]
    async fn test_each_subscriber_receives_every_event() {
        // テスト項目: 複数の購読者がそれぞれ全イベントを受け取る
        // given (前提条件):
        let bus = EventBus::new(EVENT_CHANNEL_CAPACITY);
        let mut first = bus.subscribe_connection();
        let mut second = bus.subscribe_connection();

        // when (操作):
        bus.publish_connection(ConnectionState::Connecting);
        bus.publish_connection(ConnectionState::Connected);

        // then (期待する結果): 両購読者とも同じ順序で受信する
        assert_eq!(first.recv().await.unwrap(), ConnectionState::Connecting);
        assert_eq!(first.recv().await.unwrap(), ConnectionState::Connected);
        assert_eq!(second.recv().await.unwrap(), ConnectionState::Connecting);
        assert_eq!(second.recv().await.unwrap(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_tolerated() {
        // テスト項目: 購読者ゼロでの publish がエラーにならない
        // given (前提条件):
        let bus = EventBus::new(EVENT_CHANNEL_CAPACITY);

        // when (操作) / then (期待する結果): パニックしない
        bus.publish_typing(TypingEvent {
            room_id: RoomId::new("r").unwrap(),
            typists: vec![Typist {
                user_id: UserId::new("u1").unwrap(),
                display_name: "Alice".to_string(),
            }],
        });
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_later_events() {
        // テスト項目: 後から購読した観測者は購読後のイベントのみ受け取る
        // given (前提条件):
        let bus = EventBus::new(EVENT_CHANNEL_CAPACITY);
        bus.publish_connection(ConnectionState::Connecting);

        // when (操作):
        let mut late = bus.subscribe_connection();
        bus.publish_connection(ConnectionState::Connected);

        // then (期待する結果):
        assert_eq!(late.recv().await.unwrap(), ConnectionState::Connected);
    }
}
