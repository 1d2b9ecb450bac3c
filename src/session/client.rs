//! Chat client API and its serialized event loop.
//!
//! All mutable state (message collections, typing maps, membership,
//! directory) is owned by a single spawned task. Transport events, API
//! commands, history-fetch completions and typing-expiry timers are all
//! posted onto one queue, so no two handlers for the same room's state ever
//! run concurrently and no locks guard the collections. Handlers are short
//! and non-blocking; long-running work (history fetches) is spawned and
//! posts its result back onto the same queue.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::common::time::{Clock, SystemClock};
use crate::config::ChatConfig;
use crate::domain::{
    AckOutcome, ChatMessage, ClientCommand, CommandError, ConnectionState, CorrelationId,
    DirectoryEvent, HistoryError, HistoryService, IdentityProvider, ImageRef, MessageBody,
    MessageEvent, MessageId, Room, RoomId, RoomLoadState, ServerEvent, Transport, TypingEvent,
    Typist, UserId,
};
use crate::infrastructure::history::HttpHistoryService;
use crate::infrastructure::transport::WebSocketTransport;

use super::connection::{ConnectionSignal, spawn_supervisor};
use super::directory::{RecordOutcome, RoomDirectory};
use super::events::{EVENT_CHANNEL_CAPACITY, EventBus};
use super::handle::RoomSession;
use super::membership::RoomMembership;
use super::reconcile::RoomMessages;
use super::typing::{TYPING_EXPIRY, TYPING_THROTTLE_MILLIS, TypingTracker};

/// How long a caller waits for a server acknowledgment
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `connect` waits for the first handshake outcome
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Read-only projections served by the event loop
pub(crate) enum SnapshotQuery {
    Messages {
        room_id: RoomId,
        respond: oneshot::Sender<Vec<ChatMessage>>,
    },
    Typists {
        room_id: RoomId,
        respond: oneshot::Sender<Vec<Typist>>,
    },
    Unread {
        respond: oneshot::Sender<HashMap<RoomId, u32>>,
    },
    Rooms {
        respond: oneshot::Sender<Vec<Room>>,
    },
    Connection {
        respond: oneshot::Sender<ConnectionState>,
    },
}

/// API commands posted onto the event loop
pub(crate) enum Command {
    Connect {
        respond: oneshot::Sender<ConnectionState>,
    },
    Disconnect {
        respond: oneshot::Sender<()>,
    },
    JoinRoom {
        room_id: RoomId,
        respond: oneshot::Sender<Result<(), CommandError>>,
    },
    LeaveRoom {
        /// `None` leaves the currently focused room (screen teardown)
        room_id: Option<RoomId>,
        respond: Option<oneshot::Sender<()>>,
    },
    SendMessage {
        room_id: RoomId,
        body: MessageBody,
        image: Option<ImageRef>,
        respond: oneshot::Sender<Result<ChatMessage, CommandError>>,
    },
    EditMessage {
        room_id: RoomId,
        message_id: MessageId,
        new_body: MessageBody,
        respond: oneshot::Sender<Result<(), CommandError>>,
    },
    DeleteMessage {
        room_id: RoomId,
        message_id: MessageId,
        respond: oneshot::Sender<Result<(), CommandError>>,
    },
    SetTyping {
        room_id: RoomId,
        is_typing: bool,
    },
    ListRooms {
        respond: oneshot::Sender<Result<Vec<Room>, CommandError>>,
    },
    Snapshot(SnapshotQuery),
    Shutdown,
}

/// Everything the event loop can be woken by
pub(crate) enum LoopEvent {
    Api(Command),
    Connection {
        epoch: u64,
        signal: ConnectionSignal,
    },
    Server(ServerEvent),
    TypingExpired {
        room_id: RoomId,
        user_id: UserId,
        generation: u64,
    },
    RoomsFetched {
        result: Result<Vec<Room>, HistoryError>,
    },
    RoomFetched {
        room_id: RoomId,
        result: Result<Room, HistoryError>,
    },
    MessagesFetched {
        room_id: RoomId,
        result: Result<Vec<ChatMessage>, HistoryError>,
    },
}

/// Commands awaiting their server `ack`, keyed by correlation id
enum PendingAck {
    Send {
        respond: oneshot::Sender<Result<ChatMessage, CommandError>>,
    },
    Edit {
        room_id: RoomId,
        message_id: MessageId,
        new_body: MessageBody,
        respond: oneshot::Sender<Result<(), CommandError>>,
    },
    Delete {
        room_id: RoomId,
        message_id: MessageId,
        respond: oneshot::Sender<Result<(), CommandError>>,
    },
    Join {
        respond: oneshot::Sender<Result<(), CommandError>>,
    },
}

struct EventLoop {
    transport: Arc<dyn Transport>,
    history: Arc<dyn HistoryService>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    user_id: UserId,
    bus: EventBus,
    loop_tx: mpsc::UnboundedSender<LoopEvent>,

    connection_state: ConnectionState,
    epoch: u64,
    supervisor: Option<JoinHandle<()>>,
    wire: Option<mpsc::UnboundedSender<ClientCommand>>,
    connect_waiters: Vec<oneshot::Sender<ConnectionState>>,

    membership: RoomMembership,
    rooms: HashMap<RoomId, RoomMessages>,
    typing: TypingTracker,
    directory: RoomDirectory,
    pending_acks: HashMap<CorrelationId, PendingAck>,
    rooms_waiters: Vec<oneshot::Sender<Result<Vec<Room>, CommandError>>>,
    history_loading: HashSet<RoomId>,
}

impl EventLoop {
    fn new(
        transport: Arc<dyn Transport>,
        history: Arc<dyn HistoryService>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        bus: EventBus,
        loop_tx: mpsc::UnboundedSender<LoopEvent>,
    ) -> Self {
        Self {
            transport,
            history,
            user_id: identity.user_id(),
            identity,
            clock,
            bus,
            typing: TypingTracker::new(loop_tx.clone(), TYPING_EXPIRY, TYPING_THROTTLE_MILLIS),
            loop_tx,
            connection_state: ConnectionState::Disconnected,
            epoch: 0,
            supervisor: None,
            wire: None,
            connect_waiters: Vec::new(),
            membership: RoomMembership::new(),
            rooms: HashMap::new(),
            directory: RoomDirectory::new(),
            pending_acks: HashMap::new(),
            rooms_waiters: Vec::new(),
            history_loading: HashSet::new(),
        }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<LoopEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                LoopEvent::Api(Command::Shutdown) => break,
                LoopEvent::Api(command) => self.handle_command(command),
                LoopEvent::Connection { epoch, signal } => self.handle_connection(epoch, signal),
                LoopEvent::Server(event) => self.handle_server_event(event),
                LoopEvent::TypingExpired {
                    room_id,
                    user_id,
                    generation,
                } => {
                    if self.typing.expire(&room_id, &user_id, generation) {
                        self.publish_typists(&room_id);
                    }
                }
                LoopEvent::RoomsFetched { result } => self.handle_rooms_fetched(result),
                LoopEvent::RoomFetched { room_id, result } => {
                    self.handle_room_fetched(room_id, result)
                }
                LoopEvent::MessagesFetched { room_id, result } => {
                    self.handle_messages_fetched(room_id, result)
                }
            }
        }
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
        self.wire = None;
        self.typing.clear_all();
        self.fail_pending_acks(CommandError::SessionClosed);
        tracing::debug!("chat session shut down");
    }

    // ----- API commands -----

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { respond } => self.handle_connect(respond),
            Command::Disconnect { respond } => self.handle_disconnect(respond),
            Command::JoinRoom { room_id, respond } => self.handle_join(room_id, respond),
            Command::LeaveRoom { room_id, respond } => self.handle_leave(room_id, respond),
            Command::SendMessage {
                room_id,
                body,
                image,
                respond,
            } => self.handle_send(room_id, body, image, respond),
            Command::EditMessage {
                room_id,
                message_id,
                new_body,
                respond,
            } => self.handle_edit(room_id, message_id, new_body, respond),
            Command::DeleteMessage {
                room_id,
                message_id,
                respond,
            } => self.handle_delete(room_id, message_id, respond),
            Command::SetTyping { room_id, is_typing } => {
                self.handle_set_typing(room_id, is_typing)
            }
            Command::ListRooms { respond } => {
                self.rooms_waiters.push(respond);
                self.begin_rooms_fetch();
            }
            Command::Snapshot(query) => self.handle_snapshot(query),
            Command::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    fn handle_connect(&mut self, respond: oneshot::Sender<ConnectionState>) {
        // Idempotent: while a supervisor is running, report the current
        // state instead of opening a second connection.
        if self.supervisor.is_some() {
            let _ = respond.send(self.connection_state.clone());
            return;
        }
        self.epoch += 1;
        self.supervisor = Some(spawn_supervisor(
            self.epoch,
            self.transport.clone(),
            self.identity.clone(),
            self.loop_tx.clone(),
        ));
        self.connect_waiters.push(respond);
    }

    fn handle_disconnect(&mut self, respond: oneshot::Sender<()>) {
        if let Some(handle) = self.supervisor.take() {
            handle.abort();
        }
        self.wire = None;
        self.set_connection_state(ConnectionState::Disconnected);
        self.resolve_connect_waiters();
        self.fail_pending_acks(CommandError::ConnectionLost);
        let _ = respond.send(());
    }

    fn handle_join(&mut self, room_id: RoomId, respond: oneshot::Sender<Result<(), CommandError>>) {
        let newly = self.membership.join(room_id.clone());
        self.membership.set_focus(room_id.clone());
        self.directory.reset_unread(&room_id);
        self.publish_rooms();
        self.spawn_messages_fetch(room_id.clone());
        if !self.directory.contains(&room_id) {
            self.spawn_room_fetch(room_id.clone());
        }

        if newly && let Some(wire) = &self.wire {
            let correlation_id = CorrelationId::generate();
            if wire
                .send(ClientCommand::JoinRoom {
                    correlation_id,
                    room_id,
                })
                .is_ok()
            {
                self.pending_acks
                    .insert(correlation_id, PendingAck::Join { respond });
                return;
            }
        }
        // Re-entry into an already joined room, or a deferred join while
        // disconnected: recorded in the desired set, replayed on connect.
        let _ = respond.send(Ok(()));
    }

    fn handle_leave(&mut self, room_id: Option<RoomId>, respond: Option<oneshot::Sender<()>>) {
        let target = room_id.or_else(|| self.membership.focused().cloned());
        if let Some(room_id) = target {
            let was_active = self.membership.leave(&room_id);
            if self.typing.clear_room(&room_id) {
                self.publish_typists(&room_id);
            }
            if was_active
                && let Some(wire) = &self.wire
                && wire
                    .send(ClientCommand::LeaveRoom {
                        room_id: room_id.clone(),
                    })
                    .is_err()
            {
                tracing::debug!(%room_id, "leave command dropped, connection is down");
            }
        }
        if let Some(respond) = respond {
            let _ = respond.send(());
        }
    }

    fn handle_send(
        &mut self,
        room_id: RoomId,
        body: MessageBody,
        image: Option<ImageRef>,
        respond: oneshot::Sender<Result<ChatMessage, CommandError>>,
    ) {
        // Sending while offline fails explicitly rather than queueing; a
        // queued send could silently reorder against other participants.
        let Some(wire) = &self.wire else {
            let _ = respond.send(Err(CommandError::NotConnected));
            return;
        };
        let correlation_id = CorrelationId::generate();
        let command = ClientCommand::SendMessage {
            correlation_id,
            room_id,
            body,
            image,
        };
        if wire.send(command).is_err() {
            let _ = respond.send(Err(CommandError::NotConnected));
            return;
        }
        self.pending_acks
            .insert(correlation_id, PendingAck::Send { respond });
    }

    fn handle_edit(
        &mut self,
        room_id: RoomId,
        message_id: MessageId,
        new_body: MessageBody,
        respond: oneshot::Sender<Result<(), CommandError>>,
    ) {
        let Some(wire) = &self.wire else {
            let _ = respond.send(Err(CommandError::NotConnected));
            return;
        };
        let correlation_id = CorrelationId::generate();
        let command = ClientCommand::EditMessage {
            correlation_id,
            room_id: room_id.clone(),
            message_id: message_id.clone(),
            new_body: new_body.clone(),
        };
        if wire.send(command).is_err() {
            let _ = respond.send(Err(CommandError::NotConnected));
            return;
        }
        self.pending_acks.insert(
            correlation_id,
            PendingAck::Edit {
                room_id,
                message_id,
                new_body,
                respond,
            },
        );
    }

    fn handle_delete(
        &mut self,
        room_id: RoomId,
        message_id: MessageId,
        respond: oneshot::Sender<Result<(), CommandError>>,
    ) {
        let Some(wire) = &self.wire else {
            let _ = respond.send(Err(CommandError::NotConnected));
            return;
        };
        let correlation_id = CorrelationId::generate();
        let command = ClientCommand::DeleteMessage {
            correlation_id,
            room_id: room_id.clone(),
            message_id: message_id.clone(),
        };
        if wire.send(command).is_err() {
            let _ = respond.send(Err(CommandError::NotConnected));
            return;
        }
        self.pending_acks.insert(
            correlation_id,
            PendingAck::Delete {
                room_id,
                message_id,
                respond,
            },
        );
    }

    fn handle_set_typing(&mut self, room_id: RoomId, is_typing: bool) {
        // Presence is best-effort; while offline the signal is dropped.
        if self.wire.is_none() {
            return;
        }
        let now = self.clock.now_millis();
        if !self.typing.should_send(&room_id, is_typing, now) {
            return;
        }
        if let Some(wire) = &self.wire {
            let _ = wire.send(ClientCommand::Typing { room_id, is_typing });
        }
    }

    fn handle_snapshot(&self, query: SnapshotQuery) {
        match query {
            SnapshotQuery::Messages { room_id, respond } => {
                let snapshot = self
                    .rooms
                    .get(&room_id)
                    .map(|room| room.snapshot())
                    .unwrap_or_default();
                let _ = respond.send(snapshot);
            }
            SnapshotQuery::Typists { room_id, respond } => {
                let _ = respond.send(self.typing.typists(&room_id));
            }
            SnapshotQuery::Unread { respond } => {
                let _ = respond.send(self.directory.unread_counts());
            }
            SnapshotQuery::Rooms { respond } => {
                let _ = respond.send(self.directory.rooms());
            }
            SnapshotQuery::Connection { respond } => {
                let _ = respond.send(self.connection_state.clone());
            }
        }
    }

    // ----- connection lifecycle -----

    fn handle_connection(&mut self, epoch: u64, signal: ConnectionSignal) {
        if epoch != self.epoch {
            tracing::debug!("signal from a stale supervisor discarded");
            return;
        }
        match signal {
            ConnectionSignal::Connecting => {
                self.set_connection_state(ConnectionState::Connecting);
            }
            ConnectionSignal::Connected { wire } => {
                self.wire = Some(wire);
                self.set_connection_state(ConnectionState::Connected);
                self.resolve_connect_waiters();
                self.replay_joins();
                self.begin_rooms_fetch();
            }
            ConnectionSignal::Lost => {
                self.wire = None;
                self.set_connection_state(ConnectionState::Disconnected);
                self.fail_pending_acks(CommandError::ConnectionLost);
            }
            ConnectionSignal::Failed { reason } => {
                self.wire = None;
                self.set_connection_state(ConnectionState::Error(reason));
                self.resolve_connect_waiters();
                self.fail_pending_acks(CommandError::ConnectionLost);
            }
        }
    }

    fn set_connection_state(&mut self, state: ConnectionState) {
        if self.connection_state == state {
            return;
        }
        self.connection_state = state.clone();
        self.bus.publish_connection(state);
    }

    fn resolve_connect_waiters(&mut self) {
        for respond in self.connect_waiters.drain(..) {
            let _ = respond.send(self.connection_state.clone());
        }
    }

    /// Server-side room membership does not survive a reconnect: re-issue
    /// join for every room in the desired set, in issuance order.
    fn replay_joins(&mut self) {
        let Some(wire) = &self.wire else {
            return;
        };
        for room_id in self.membership.replay_order() {
            let correlation_id = CorrelationId::generate();
            if wire
                .send(ClientCommand::JoinRoom {
                    correlation_id,
                    room_id: room_id.clone(),
                })
                .is_err()
            {
                tracing::warn!("connection went down while replaying joins");
                break;
            }
            tracing::debug!(%room_id, "re-joined room after (re)connect");
        }
    }

    // ----- server events -----

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage(message) => self.apply_new_message(message),
            ServerEvent::MessageEdited {
                room_id,
                message_id,
                new_body,
            } => {
                if !self.membership.is_active(&room_id) {
                    tracing::debug!(%room_id, "edit for an inactive room discarded");
                    return;
                }
                let applied = self
                    .rooms
                    .entry(room_id.clone())
                    .or_default()
                    .edit(&message_id, new_body.clone());
                if applied {
                    self.bus.publish_message(MessageEvent::Edited {
                        room_id,
                        message_id,
                        new_body,
                    });
                }
            }
            ServerEvent::MessageDeleted {
                room_id,
                message_id,
            } => {
                if !self.membership.is_active(&room_id) {
                    tracing::debug!(%room_id, "delete for an inactive room discarded");
                    return;
                }
                let applied = self
                    .rooms
                    .entry(room_id.clone())
                    .or_default()
                    .tombstone(&message_id);
                if applied {
                    self.bus.publish_message(MessageEvent::Deleted {
                        room_id,
                        message_id,
                    });
                }
            }
            ServerEvent::UserTyping(indicator) => {
                // No self-typing display
                if indicator.user_id == self.user_id {
                    return;
                }
                if !self.membership.is_active(&indicator.room_id) {
                    tracing::debug!(room_id = %indicator.room_id, "typing for an inactive room discarded");
                    return;
                }
                if self.typing.observe(&indicator) {
                    self.publish_typists(&indicator.room_id);
                }
            }
            ServerEvent::Ack {
                in_reply_to,
                outcome,
            } => self.handle_ack(in_reply_to, outcome),
        }
    }

    fn apply_new_message(&mut self, message: ChatMessage) {
        let room_id = message.room_id.clone();
        if !self.membership.is_active(&room_id) {
            tracing::debug!(%room_id, "message for an inactive room discarded");
            return;
        }
        let inserted = self
            .rooms
            .entry(room_id.clone())
            .or_default()
            .insert(message.clone());
        if !inserted {
            // Duplicate delivery (own echo); already logged by the collection.
            return;
        }
        // Own messages and messages for the focused room are already seen.
        let count_unread =
            !self.membership.is_focused(&room_id) && message.sender_id != self.user_id;
        let outcome = self.directory.record_message(
            &room_id,
            message.body.as_str(),
            message.sent_at,
            count_unread,
        );
        self.bus.publish_message(MessageEvent::New {
            room_id: room_id.clone(),
            message,
        });
        self.publish_rooms();
        if outcome == RecordOutcome::Unknown {
            self.begin_rooms_fetch();
        }
    }

    fn handle_ack(&mut self, in_reply_to: CorrelationId, outcome: AckOutcome) {
        let Some(pending) = self.pending_acks.remove(&in_reply_to) else {
            // Expected for joins replayed after reconnect, or when the
            // caller already timed out.
            tracing::debug!(%in_reply_to, "ack without a pending command");
            return;
        };
        match (pending, outcome) {
            (PendingAck::Send { respond }, AckOutcome::Accepted { message: Some(message) }) => {
                self.apply_new_message(message.clone());
                let _ = respond.send(Ok(message));
            }
            (PendingAck::Send { respond }, AckOutcome::Accepted { message: None }) => {
                tracing::warn!("send acknowledgment carried no message payload");
                let _ = respond.send(Err(CommandError::Rejected(
                    "acknowledgment carried no message".to_string(),
                )));
            }
            (
                PendingAck::Edit {
                    room_id,
                    message_id,
                    new_body,
                    respond,
                },
                AckOutcome::Accepted { .. },
            ) => {
                let applied = self
                    .rooms
                    .entry(room_id.clone())
                    .or_default()
                    .edit(&message_id, new_body.clone());
                if applied {
                    self.bus.publish_message(MessageEvent::Edited {
                        room_id,
                        message_id,
                        new_body,
                    });
                }
                let _ = respond.send(Ok(()));
            }
            (
                PendingAck::Delete {
                    room_id,
                    message_id,
                    respond,
                },
                AckOutcome::Accepted { .. },
            ) => {
                let applied = self
                    .rooms
                    .entry(room_id.clone())
                    .or_default()
                    .tombstone(&message_id);
                if applied {
                    self.bus.publish_message(MessageEvent::Deleted {
                        room_id,
                        message_id,
                    });
                }
                let _ = respond.send(Ok(()));
            }
            (PendingAck::Join { respond }, AckOutcome::Accepted { .. }) => {
                let _ = respond.send(Ok(()));
            }
            (PendingAck::Send { respond }, AckOutcome::Rejected { reason }) => {
                let _ = respond.send(Err(CommandError::Rejected(reason)));
            }
            (
                PendingAck::Edit { respond, .. }
                | PendingAck::Delete { respond, .. }
                | PendingAck::Join { respond },
                AckOutcome::Rejected { reason },
            ) => {
                let _ = respond.send(Err(CommandError::Rejected(reason)));
            }
        }
    }

    fn fail_pending_acks(&mut self, error: CommandError) {
        for (_, pending) in self.pending_acks.drain() {
            match pending {
                PendingAck::Send { respond } => {
                    let _ = respond.send(Err(error.clone()));
                }
                PendingAck::Edit { respond, .. }
                | PendingAck::Delete { respond, .. }
                | PendingAck::Join { respond } => {
                    let _ = respond.send(Err(error.clone()));
                }
            }
        }
    }

    // ----- history fetches -----

    fn begin_rooms_fetch(&mut self) {
        if !self.directory.begin_loading() {
            return;
        }
        self.bus
            .publish_directory(DirectoryEvent::LoadStateChanged(RoomLoadState::Loading));
        let history = self.history.clone();
        let user_id = self.user_id.clone();
        let tx = self.loop_tx.clone();
        tokio::spawn(async move {
            let result = history.fetch_rooms(&user_id).await;
            let _ = tx.send(LoopEvent::RoomsFetched { result });
        });
    }

    fn handle_rooms_fetched(&mut self, result: Result<Vec<Room>, HistoryError>) {
        match result {
            Ok(rooms) => {
                self.directory.finish_loading(rooms);
                self.bus
                    .publish_directory(DirectoryEvent::LoadStateChanged(RoomLoadState::Loaded));
                self.publish_rooms();
                let rooms = self.directory.rooms();
                for respond in self.rooms_waiters.drain(..) {
                    let _ = respond.send(Ok(rooms.clone()));
                }
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!("room list fetch failed: {}", reason);
                self.directory.fail_loading(reason.clone());
                self.bus.publish_directory(DirectoryEvent::LoadStateChanged(
                    RoomLoadState::Error(reason.clone()),
                ));
                for respond in self.rooms_waiters.drain(..) {
                    let _ = respond.send(Err(CommandError::RoomList(reason.clone())));
                }
            }
        }
    }

    fn handle_room_fetched(&mut self, room_id: RoomId, result: Result<Room, HistoryError>) {
        match result {
            Ok(room) => {
                self.directory.upsert_room(room);
                self.publish_rooms();
            }
            Err(e) => tracing::debug!(%room_id, "room detail fetch failed: {}", e),
        }
    }

    fn handle_messages_fetched(
        &mut self,
        room_id: RoomId,
        result: Result<Vec<ChatMessage>, HistoryError>,
    ) {
        self.history_loading.remove(&room_id);
        // The user may have navigated away while the fetch was in flight.
        if !self.membership.is_active(&room_id) {
            tracing::debug!(%room_id, "history for a room left in the meantime discarded");
            return;
        }
        match result {
            Ok(messages) => {
                self.rooms
                    .entry(room_id.clone())
                    .or_default()
                    .hydrate(messages);
                self.bus
                    .publish_message(MessageEvent::HistoryLoaded { room_id });
            }
            Err(e) => tracing::warn!(%room_id, "history fetch failed: {}", e),
        }
    }

    fn spawn_messages_fetch(&mut self, room_id: RoomId) {
        if !self.history_loading.insert(room_id.clone()) {
            return;
        }
        let history = self.history.clone();
        let tx = self.loop_tx.clone();
        tokio::spawn(async move {
            let result = history.fetch_messages(&room_id).await;
            let _ = tx.send(LoopEvent::MessagesFetched { room_id, result });
        });
    }

    fn spawn_room_fetch(&self, room_id: RoomId) {
        let history = self.history.clone();
        let tx = self.loop_tx.clone();
        tokio::spawn(async move {
            let result = history.fetch_room(&room_id).await;
            let _ = tx.send(LoopEvent::RoomFetched { room_id, result });
        });
    }

    // ----- projections -----

    fn publish_typists(&self, room_id: &RoomId) {
        self.bus.publish_typing(TypingEvent {
            room_id: room_id.clone(),
            typists: self.typing.typists(room_id),
        });
    }

    fn publish_rooms(&self) {
        self.bus.publish_directory(DirectoryEvent::RoomsUpdated {
            rooms: self.directory.rooms(),
            unread: self.directory.unread_counts(),
        });
    }
}

/// Room-based realtime chat client.
///
/// Explicitly constructed with its collaborators (transport, history
/// service, identity provider, clock) so lifecycle and testability are
/// explicit; multiple independent instances may coexist.
///
/// All methods are safe to call from any task; state lives in a single
/// background event loop that is shut down when the client is dropped.
pub struct ChatClient {
    loop_tx: mpsc::UnboundedSender<LoopEvent>,
    bus: EventBus,
}

impl ChatClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        history: Arc<dyn HistoryService>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (loop_tx, loop_rx) = mpsc::unbounded_channel();
        let bus = EventBus::new(EVENT_CHANNEL_CAPACITY);
        let event_loop = EventLoop::new(
            transport,
            history,
            identity,
            clock,
            bus.clone(),
            loop_tx.clone(),
        );
        tokio::spawn(event_loop.run(loop_rx));
        Self { loop_tx, bus }
    }

    /// Construct a client against the real WebSocket transport and HTTP
    /// history service described by `config`.
    pub fn from_config(config: &ChatConfig, identity: Arc<dyn IdentityProvider>) -> Self {
        let transport = Arc::new(WebSocketTransport::new(config.ws_url.clone()));
        let history = Arc::new(HttpHistoryService::new(
            config.history_base_url.clone(),
            config.history_passcode.clone(),
        ));
        Self::new(transport, history, identity, Arc::new(SystemClock))
    }

    /// Establish the connection. Idempotent: while already connected or
    /// connecting this reports the current state instead of opening a
    /// second connection. A fresh call suspends until the first handshake
    /// outcome; reconnection then continues in the background.
    pub async fn connect(&self) -> Result<ConnectionState, CommandError> {
        let (respond, done) = oneshot::channel();
        match timeout(
            CONNECT_TIMEOUT,
            self.request(Command::Connect { respond }, done),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CommandError::Timeout),
        }
    }

    /// Tear down the connection. Safe to call when already disconnected.
    pub async fn disconnect(&self) -> Result<(), CommandError> {
        let (respond, done) = oneshot::channel();
        self.request(Command::Disconnect { respond }, done).await
    }

    /// Join a room and focus it. Tolerates repeated calls for the same room
    /// without issuing duplicate join commands. While disconnected the join
    /// is deferred and replayed once connected.
    ///
    /// The returned handle leaves the room when dropped.
    pub async fn join_room(&self, room_id: &RoomId) -> Result<RoomSession, CommandError> {
        let (respond, done) = oneshot::channel();
        let command = Command::JoinRoom {
            room_id: room_id.clone(),
            respond,
        };
        let outcome = match timeout(COMMAND_TIMEOUT, self.request(command, done)).await {
            Ok(sent) => sent?,
            Err(_) => return Err(CommandError::Timeout),
        };
        outcome?;
        Ok(RoomSession::new(room_id.clone(), self.loop_tx.clone()))
    }

    /// Leave a room explicitly. A no-op if the room is not active.
    pub async fn leave_room(&self, room_id: &RoomId) -> Result<(), CommandError> {
        let (respond, done) = oneshot::channel();
        let command = Command::LeaveRoom {
            room_id: Some(room_id.clone()),
            respond: Some(respond),
        };
        self.request(command, done).await
    }

    /// Leave whatever room is currently focused (screen teardown).
    pub async fn leave_current_room(&self) -> Result<(), CommandError> {
        let (respond, done) = oneshot::channel();
        let command = Command::LeaveRoom {
            room_id: None,
            respond: Some(respond),
        };
        self.request(command, done).await
    }

    /// Send a message and wait for the server-assigned id. Fails with
    /// [`CommandError::NotConnected`] while offline; nothing is dropped
    /// silently. The broadcast echo of the returned message is deduplicated.
    pub async fn send_message(
        &self,
        room_id: &RoomId,
        body: &str,
        image: Option<ImageRef>,
    ) -> Result<ChatMessage, CommandError> {
        let body = MessageBody::new(body)?;
        let (respond, done) = oneshot::channel();
        let command = Command::SendMessage {
            room_id: room_id.clone(),
            body,
            image,
            respond,
        };
        match timeout(COMMAND_TIMEOUT, self.request(command, done)).await {
            Ok(sent) => sent?,
            Err(_) => Err(CommandError::Timeout),
        }
    }

    /// Edit a message in place; on confirmation the local entry's body is
    /// replaced and its edited flag set, without changing its position.
    pub async fn edit_message(
        &self,
        room_id: &RoomId,
        message_id: &MessageId,
        new_body: &str,
    ) -> Result<(), CommandError> {
        let new_body = MessageBody::new(new_body)?;
        let (respond, done) = oneshot::channel();
        let command = Command::EditMessage {
            room_id: room_id.clone(),
            message_id: message_id.clone(),
            new_body,
            respond,
        };
        match timeout(COMMAND_TIMEOUT, self.request(command, done)).await {
            Ok(sent) => sent?,
            Err(_) => Err(CommandError::Timeout),
        }
    }

    /// Tombstone a message; the entry keeps its slot so projections can
    /// render a placeholder.
    pub async fn delete_message(
        &self,
        room_id: &RoomId,
        message_id: &MessageId,
    ) -> Result<(), CommandError> {
        let (respond, done) = oneshot::channel();
        let command = Command::DeleteMessage {
            room_id: room_id.clone(),
            message_id: message_id.clone(),
            respond,
        };
        match timeout(COMMAND_TIMEOUT, self.request(command, done)).await {
            Ok(sent) => sent?,
            Err(_) => Err(CommandError::Timeout),
        }
    }

    /// Signal typing state. Cheap and idempotent to invoke on every
    /// keystroke; bursts are coalesced before reaching the transport.
    pub fn set_typing(&self, room_id: &RoomId, is_typing: bool) -> Result<(), CommandError> {
        self.loop_tx
            .send(LoopEvent::Api(Command::SetTyping {
                room_id: room_id.clone(),
                is_typing,
            }))
            .map_err(|_| CommandError::SessionClosed)
    }

    /// Fetch the room list (pull-to-refresh semantics), sorted by
    /// last-message time descending. Concurrent calls share one fetch.
    pub async fn list_rooms(&self) -> Result<Vec<Room>, CommandError> {
        let (respond, done) = oneshot::channel();
        match timeout(
            COMMAND_TIMEOUT,
            self.request(Command::ListRooms { respond }, done),
        )
        .await
        {
            Ok(sent) => sent?,
            Err(_) => Err(CommandError::Timeout),
        }
    }

    /// Read-only snapshot of a room's message collection, in server order.
    pub async fn messages(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, CommandError> {
        let (respond, done) = oneshot::channel();
        let query = SnapshotQuery::Messages {
            room_id: room_id.clone(),
            respond,
        };
        self.request(Command::Snapshot(query), done).await
    }

    /// Users currently typing in a room, sorted for display.
    pub async fn typists(&self, room_id: &RoomId) -> Result<Vec<Typist>, CommandError> {
        let (respond, done) = oneshot::channel();
        let query = SnapshotQuery::Typists {
            room_id: room_id.clone(),
            respond,
        };
        self.request(Command::Snapshot(query), done).await
    }

    /// Unread counts per room.
    pub async fn unread_counts(&self) -> Result<HashMap<RoomId, u32>, CommandError> {
        let (respond, done) = oneshot::channel();
        self.request(Command::Snapshot(SnapshotQuery::Unread { respond }), done)
            .await
    }

    /// Cached room directory without triggering a fetch.
    pub async fn rooms(&self) -> Result<Vec<Room>, CommandError> {
        let (respond, done) = oneshot::channel();
        self.request(Command::Snapshot(SnapshotQuery::Rooms { respond }), done)
            .await
    }

    /// Current transport status.
    pub async fn connection_state(&self) -> Result<ConnectionState, CommandError> {
        let (respond, done) = oneshot::channel();
        self.request(
            Command::Snapshot(SnapshotQuery::Connection { respond }),
            done,
        )
        .await
    }

    pub fn subscribe_messages(&self) -> tokio::sync::broadcast::Receiver<MessageEvent> {
        self.bus.subscribe_messages()
    }

    pub fn subscribe_typing(&self) -> tokio::sync::broadcast::Receiver<TypingEvent> {
        self.bus.subscribe_typing()
    }

    pub fn subscribe_connection(&self) -> tokio::sync::broadcast::Receiver<ConnectionState> {
        self.bus.subscribe_connection()
    }

    pub fn subscribe_directory(&self) -> tokio::sync::broadcast::Receiver<DirectoryEvent> {
        self.bus.subscribe_directory()
    }

    async fn request<T>(
        &self,
        command: Command,
        done: oneshot::Receiver<T>,
    ) -> Result<T, CommandError> {
        self.loop_tx
            .send(LoopEvent::Api(command))
            .map_err(|_| CommandError::SessionClosed)?;
        done.await.map_err(|_| CommandError::SessionClosed)
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        let _ = self.loop_tx.send(LoopEvent::Api(Command::Shutdown));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

    use crate::domain::{
        MockHistoryService, RoomKind, RoomPreview, StaticIdentity, Timestamp, TransportConnection,
        TransportError,
    };

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - ChatClient の公開 API とイベントループの結合動作のうち、
    //   履歴サービス（モック）とトランスポート（フェイク）だけで
    //   閉じて検証できるもの
    //
    // 【なぜこのテストが必要か】
    // - list_rooms の状態機械とソートは UI のルーム一覧の正しさに直結する
    // - connect の冪等性は二重接続という回収困難な不具合を防ぐ
    //
    // 【どのようなシナリオをテストするか】
    // 1. list_rooms が履歴サービスの結果を降順ソートで返す
    // 2. 取得失敗が再試行可能なエラーとして呼び出し元へ返る
    // 3. オフライン送信が明示的に失敗する
    // 4. 連続した connect がトランスポートを一度しか開かない
    // ========================================

    fn room(id: &str, last_message_at: Option<i64>) -> Room {
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

    fn identity() -> Arc<StaticIdentity> {
        Arc::new(StaticIdentity::new(
            UserId::new("u1").unwrap(),
            "Alice",
            "token-1",
        ))
    }

    /// Transport that is never expected to open
    struct UnreachableTransport;

    #[async_trait]
    impl Transport for UnreachableTransport {
        async fn open(
            &self,
            _auth: &crate::domain::HandshakeAuth,
        ) -> Result<TransportConnection, TransportError> {
            Err(TransportError::Handshake("unreachable".to_string()))
        }
    }

    /// Transport that counts opens and keeps its channel ends alive
    struct CountingTransport {
        opens: AtomicUsize,
        #[allow(clippy::type_complexity)]
        held: Mutex<Vec<(UnboundedReceiver<ClientCommand>, UnboundedSender<ServerEvent>)>>,
    }

    impl CountingTransport {
        fn new() -> Self {
            Self {
                opens: AtomicUsize::new(0),
                held: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn open(
            &self,
            _auth: &crate::domain::HandshakeAuth,
        ) -> Result<TransportConnection, TransportError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
            let (ev_tx, ev_rx) = mpsc::unbounded_channel();
            self.held.lock().unwrap().push((cmd_rx, ev_tx));
            Ok(TransportConnection {
                commands: cmd_tx,
                events: ev_rx,
            })
        }
    }

    #[tokio::test]
    async fn test_list_rooms_returns_sorted_directory() {
        // テスト項目: list_rooms が最終メッセージ時刻の降順でルームを返す
        // given (前提条件):
        let mut history = MockHistoryService::new();
        history
            .expect_fetch_rooms()
            .returning(|_| Ok(vec![room("r-old", Some(100)), room("r-new", Some(300))]));
        let client = ChatClient::new(
            Arc::new(UnreachableTransport),
            Arc::new(history),
            identity(),
            Arc::new(SystemClock),
        );

        // when (操作):
        let rooms = client.list_rooms().await.unwrap();

        // then (期待する結果):
        let ids: Vec<&str> = rooms.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r-new", "r-old"]);
    }

    #[tokio::test]
    async fn test_list_rooms_emits_load_state_events() {
        // テスト項目: 取得中に Loading → Loaded の状態イベントが流れる
        // given (前提条件):
        let mut history = MockHistoryService::new();
        history.expect_fetch_rooms().returning(|_| Ok(vec![]));
        let client = ChatClient::new(
            Arc::new(UnreachableTransport),
            Arc::new(history),
            identity(),
            Arc::new(SystemClock),
        );
        let mut directory_events = client.subscribe_directory();

        // when (操作):
        client.list_rooms().await.unwrap();

        // then (期待する結果):
        assert_eq!(
            directory_events.recv().await.unwrap(),
            DirectoryEvent::LoadStateChanged(RoomLoadState::Loading)
        );
        assert_eq!(
            directory_events.recv().await.unwrap(),
            DirectoryEvent::LoadStateChanged(RoomLoadState::Loaded)
        );
    }

    #[tokio::test]
    async fn test_list_rooms_failure_is_retryable() {
        // テスト項目: 取得失敗がエラーとして返り、その後の再試行が成功する
        // given (前提条件):
        let mut history = MockHistoryService::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_mock = calls.clone();
        history.expect_fetch_rooms().returning(move |_| {
            if calls_in_mock.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(HistoryError::Status(503))
            } else {
                Ok(vec![room("r1", Some(100))])
            }
        });
        let client = ChatClient::new(
            Arc::new(UnreachableTransport),
            Arc::new(history),
            identity(),
            Arc::new(SystemClock),
        );

        // when (操作):
        let first = client.list_rooms().await;
        let second = client.list_rooms().await;

        // then (期待する結果):
        assert!(matches!(first, Err(CommandError::RoomList(_))));
        assert_eq!(second.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_message_while_offline_fails_explicitly() {
        // テスト項目: 未接続での送信が NotConnected で明示的に失敗する
        // given (前提条件):
        let mut history = MockHistoryService::new();
        history.expect_fetch_rooms().returning(|_| Ok(vec![]));
        let client = ChatClient::new(
            Arc::new(UnreachableTransport),
            Arc::new(history),
            identity(),
            Arc::new(SystemClock),
        );

        // when (操作):
        let result = client
            .send_message(&RoomId::new("r1").unwrap(), "Hello", None)
            .await;

        // then (期待する結果):
        assert_eq!(result.unwrap_err(), CommandError::NotConnected);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        // テスト項目: 接続中・接続済みでの connect がトランスポートを開き直さない
        // given (前提条件):
        let mut history = MockHistoryService::new();
        history.expect_fetch_rooms().returning(|_| Ok(vec![]));
        let transport = Arc::new(CountingTransport::new());
        let client = ChatClient::new(
            transport.clone(),
            Arc::new(history),
            identity(),
            Arc::new(SystemClock),
        );

        // when (操作):
        let first = client.connect().await.unwrap();
        let second = client.connect().await.unwrap();

        // then (期待する結果):
        assert_eq!(first, ConnectionState::Connected);
        assert_eq!(second, ConnectionState::Connected);
        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_reports_handshake_failure() {
        // テスト項目: ハンドシェイク失敗が error(reason) として返る
        // given (前提条件):
        let mut history = MockHistoryService::new();
        history.expect_fetch_rooms().returning(|_| Ok(vec![]));
        let client = ChatClient::new(
            Arc::new(UnreachableTransport),
            Arc::new(history),
            identity(),
            Arc::new(SystemClock),
        );

        // when (操作):
        let state = client.connect().await.unwrap();

        // then (期待する結果): 理由つきのエラー状態（裏では再試行が続く）
        assert!(matches!(state, ConnectionState::Error(_)));
    }
}
