//! Connection supervision with automatic reconnect.
//!
//! One supervisor task per `connect()` call: it opens the transport with a
//! freshly obtained bearer token, pumps server events onto the session's
//! single queue, and on loss retries forever at a fixed interval. Giving up
//! is the caller's decision (an explicit `disconnect()` aborts the task),
//! not the supervisor's.
//!
//! Signals carry the epoch of the supervisor that produced them so the event
//! loop can discard stragglers from an aborted supervisor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::{ClientCommand, IdentityProvider, Transport};

use super::client::LoopEvent;

pub(crate) const RECONNECT_INTERVAL_SECS: u64 = 5;

/// Connection lifecycle notifications posted onto the event loop
#[derive(Debug)]
pub(crate) enum ConnectionSignal {
    Connecting,
    /// Handshake succeeded; `wire` is the live command sink
    Connected {
        wire: mpsc::UnboundedSender<ClientCommand>,
    },
    /// The event stream ended; a retry follows
    Lost,
    /// The handshake failed; a retry follows
    Failed { reason: String },
}

pub(crate) fn spawn_supervisor(
    epoch: u64,
    transport: Arc<dyn Transport>,
    identity: Arc<dyn IdentityProvider>,
    loop_tx: mpsc::UnboundedSender<LoopEvent>,
) -> JoinHandle<()> {
    tokio::spawn(supervise(epoch, transport, identity, loop_tx))
}

async fn supervise(
    epoch: u64,
    transport: Arc<dyn Transport>,
    identity: Arc<dyn IdentityProvider>,
    loop_tx: mpsc::UnboundedSender<LoopEvent>,
) {
    let send = |signal: ConnectionSignal| {
        loop_tx
            .send(LoopEvent::Connection { epoch, signal })
            .is_ok()
    };

    loop {
        if !send(ConnectionSignal::Connecting) {
            return;
        }

        // The token is short-lived; fetch a fresh one for every attempt.
        let auth = match identity.bearer_token().await {
            Ok(token) => crate::domain::HandshakeAuth {
                user_id: identity.user_id(),
                token,
            },
            Err(e) => {
                tracing::warn!("could not obtain bearer token: {}", e);
                if !send(ConnectionSignal::Failed {
                    reason: e.to_string(),
                }) {
                    return;
                }
                tokio::time::sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS)).await;
                continue;
            }
        };

        match transport.open(&auth).await {
            Ok(mut connection) => {
                tracing::info!("connected to the messaging server");
                if !send(ConnectionSignal::Connected {
                    wire: connection.commands.clone(),
                }) {
                    return;
                }

                // Pump server events until the connection dies.
                while let Some(event) = connection.events.recv().await {
                    if loop_tx.send(LoopEvent::Server(event)).is_err() {
                        return;
                    }
                }

                tracing::warn!("connection lost, reconnecting");
                if !send(ConnectionSignal::Lost) {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!("connection attempt failed: {}", e);
                if !send(ConnectionSignal::Failed {
                    reason: e.to_string(),
                }) {
                    return;
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(RECONNECT_INTERVAL_SECS)).await;
    }
}
