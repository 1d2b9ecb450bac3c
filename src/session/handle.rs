//! Scoped room-membership handle.
//!
//! `join_room` returns a [`RoomSession`]; dropping it (or calling
//! [`RoomSession::leave`]) leaves the room, which cancels the room's pending
//! typing-expiry timers and stops events for it from reaching live state.
//! Cleanup is tied to this handle, not to any UI framework's teardown
//! ordering.

use tokio::sync::{mpsc, oneshot};

use crate::domain::{CommandError, RoomId};

use super::client::{Command, LoopEvent};

/// Handle representing membership of one room
#[derive(Debug)]
pub struct RoomSession {
    room_id: RoomId,
    loop_tx: mpsc::UnboundedSender<LoopEvent>,
    left: bool,
}

impl RoomSession {
    pub(crate) fn new(room_id: RoomId, loop_tx: mpsc::UnboundedSender<LoopEvent>) -> Self {
        Self {
            room_id,
            loop_tx,
            left: false,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Leave the room explicitly and wait until the session has processed
    /// the departure (timers cancelled, membership updated).
    pub async fn leave(mut self) -> Result<(), CommandError> {
        self.left = true;
        let (respond, done) = oneshot::channel();
        self.loop_tx
            .send(LoopEvent::Api(Command::LeaveRoom {
                room_id: Some(self.room_id.clone()),
                respond: Some(respond),
            }))
            .map_err(|_| CommandError::SessionClosed)?;
        done.await.map_err(|_| CommandError::SessionClosed)
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        if self.left {
            return;
        }
        // Best-effort: if the session itself is gone there is nothing to
        // clean up anymore.
        let _ = self.loop_tx.send(LoopEvent::Api(Command::LeaveRoom {
            room_id: Some(self.room_id.clone()),
            respond: None,
        }));
    }
}
