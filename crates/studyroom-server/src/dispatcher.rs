//! Outbound delivery.
//!
//! Owns one bounded channel per live connection and executes the gateway's
//! actions against them. Broadcasts take a snapshot of room membership when
//! they run, serialize the event once, and hand the same text to every
//! member. Delivery never waits: a full or closed queue drops that one
//! delivery and logs it, and the rest of the room is unaffected.

use std::{collections::HashMap, sync::Arc};

use studyroom_proto::{RoomId, ServerEvent};
use tokio::sync::{RwLock, mpsc};

use crate::{
    gateway::{GatewayAction, LogLevel},
    registry::SharedRooms,
};

/// Frame queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Encoded event text
    Text(Arc<str>),
    /// Close the socket with this reason
    Close(String),
}

/// Per-connection outbound channels plus the room index used for fan-out.
pub struct Dispatcher {
    rooms: SharedRooms,
    outbound: RwLock<HashMap<u64, mpsc::Sender<Outbound>>>,
}

impl Dispatcher {
    /// Create a dispatcher that broadcasts over `rooms`.
    pub fn new(rooms: SharedRooms) -> Self {
        Self { rooms, outbound: RwLock::new(HashMap::new()) }
    }

    /// Attach a connection's outbound channel.
    pub async fn register(&self, session_id: u64, sender: mpsc::Sender<Outbound>) {
        self.outbound.write().await.insert(session_id, sender);
    }

    /// Detach a connection. Dropping the sender lets its writer drain and
    /// exit.
    pub async fn unregister(&self, session_id: u64) {
        self.outbound.write().await.remove(&session_id);
    }

    /// Number of attached connections.
    pub async fn connection_count(&self) -> usize {
        self.outbound.read().await.len()
    }

    /// Queue an event for one session. Returns whether it was queued.
    pub async fn send_to(&self, session_id: u64, event: &ServerEvent) -> bool {
        let Some(text) = encode(event) else {
            return false;
        };

        let outbound = self.outbound.read().await;
        match outbound.get(&session_id) {
            Some(sender) => deliver(session_id, sender, Outbound::Text(text)),
            None => {
                tracing::debug!(session_id, event = event.name(), "send to detached session");
                false
            },
        }
    }

    /// Queue an event for every current member of `room_id`.
    ///
    /// Returns the number of sessions it was queued for.
    pub async fn broadcast(&self, room_id: &RoomId, event: &ServerEvent) -> usize {
        let members = self.rooms.read().await.members_of(room_id);
        if members.is_empty() {
            return 0;
        }

        let Some(text) = encode(event) else {
            return 0;
        };

        let outbound = self.outbound.read().await;
        let mut delivered = 0;
        for session_id in members {
            if let Some(sender) = outbound.get(&session_id) {
                if deliver(session_id, sender, Outbound::Text(Arc::clone(&text))) {
                    delivered += 1;
                }
            }
        }

        tracing::trace!(%room_id, event = event.name(), delivered, "broadcast");
        delivered
    }

    /// Ask a connection's writer to close the socket and detach it.
    pub async fn close(&self, session_id: u64, reason: &str) {
        if let Some(sender) = self.outbound.write().await.remove(&session_id) {
            if sender.try_send(Outbound::Close(reason.to_string())).is_err() {
                // Queue full or writer gone; dropping the sender still ends
                // the writer once it drains.
                tracing::debug!(session_id, "close frame not queued");
            }
        }
    }

    /// Execute gateway actions in order.
    ///
    /// Returns the sessions closed by `CloseConnection` actions.
    pub async fn execute(&self, actions: Vec<GatewayAction>) -> Vec<u64> {
        let mut closed = Vec::new();

        for action in actions {
            match action {
                GatewayAction::SendToSession { session_id, event } => {
                    self.send_to(session_id, &event).await;
                },
                GatewayAction::BroadcastToRoom { room_id, event } => {
                    self.broadcast(&room_id, &event).await;
                },
                GatewayAction::CloseConnection { session_id, reason } => {
                    tracing::info!("Closing connection {}: {}", session_id, reason);
                    self.close(session_id, &reason).await;
                    closed.push(session_id);
                },
                GatewayAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }

        closed
    }
}

fn encode(event: &ServerEvent) -> Option<Arc<str>> {
    match event.encode() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            tracing::error!(event = event.name(), error = %e, "failed to encode event");
            None
        },
    }
}

fn deliver(session_id: u64, sender: &mpsc::Sender<Outbound>, frame: Outbound) -> bool {
    match sender.try_send(frame) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::warn!(session_id, "outbound queue full, dropping event");
            false
        },
        Err(mpsc::error::TrySendError::Closed(_)) => {
            tracing::debug!(session_id, "outbound queue closed, dropping event");
            false
        },
    }
}
