//! Chat gateway.
//!
//! Ties together per-connection session records, the room registry, the
//! token verifier, and the message store. The runtime feeds it
//! [`GatewayEvent`]s and executes the [`GatewayAction`]s it returns; the
//! gateway itself never touches a socket.
//!
//! # Locking
//!
//! Session records live behind one `tokio::sync::Mutex`, the registry behind
//! a shared `RwLock`. When both are held they are taken sessions first. Neither
//! is held across a store call: handlers snapshot what they need, release,
//! await the store, and then re-check that the session is still live before
//! touching anything else.

use std::collections::HashMap;

use studyroom_core::{ConnectionSession, Environment, SessionError, SessionState};
use studyroom_proto::{
    AuthenticatedPayload, ChatMessage, ClientEvent, MessageId, RoomId, ServerEvent, UserId,
};
use tokio::sync::Mutex;

use crate::{
    auth::TokenVerifier,
    gateway_error::GatewayError,
    registry::{RoomRegistry, SharedRooms},
    storage::{MessageStore, StorageError},
};

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Maximum message content length in bytes
    pub max_message_len: usize,
    /// Echo rejected events back to the requesting session as `error` events
    pub error_replies: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { max_connections: 10_000, max_message_len: 4_096, error_replies: true }
    }
}

/// Events that the gateway processes.
///
/// These are produced by the runtime (production server or test harness).
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// A new connection was accepted
    ConnectionOpened {
        /// Unique connection ID assigned by the runtime
        session_id: u64,
    },

    /// A text frame was received from a connection
    FrameReceived {
        /// Connection that sent the frame
        session_id: u64,
        /// Raw frame text, decoded by the gateway
        text: String,
    },

    /// An already-decoded event was received from a connection
    EventReceived {
        /// Connection that sent the event
        session_id: u64,
        /// The event
        event: ClientEvent,
    },

    /// A connection was closed (by peer or error)
    ConnectionClosed {
        /// Connection that was closed
        session_id: u64,
        /// Reason for closure
        reason: String,
    },
}

/// Actions that the gateway produces.
///
/// These are executed by runtime-specific code (production or harness).
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayAction {
    /// Send an event to a single session
    SendToSession {
        /// Target session ID
        session_id: u64,
        /// Event to send
        event: ServerEvent,
    },

    /// Send an event to every session joined to a room at execution time
    BroadcastToRoom {
        /// Target room
        room_id: RoomId,
        /// Event to broadcast
        event: ServerEvent,
    },

    /// Close a connection
    CloseConnection {
        /// Session to close
        session_id: u64,
        /// Reason for closure
        reason: String,
    },

    /// Log a message (for debugging/monitoring)
    Log {
        /// Log level
        level: LogLevel,
        /// Message to log
        message: String,
    },
}

/// Log levels for gateway actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug information
    Debug,
    /// Informational message
    Info,
    /// Warning
    Warn,
    /// Error
    Error,
}

/// Point-in-time copy of one session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Session id
    pub session_id: u64,
    /// Authentication state
    pub state: SessionState,
    /// Joined rooms, in id order
    pub joined: Vec<RoomId>,
}

/// Action-based chat gateway.
///
/// Shared by every connection task (`Arc<ChatGateway<..>>`); all methods take
/// `&self`.
pub struct ChatGateway<E, S, V>
where
    E: Environment,
    S: MessageStore,
    V: TokenVerifier,
{
    /// Live sessions (session_id → record)
    sessions: Mutex<HashMap<u64, ConnectionSession>>,
    /// Room membership index, shared with the dispatcher
    rooms: SharedRooms,
    /// Message store
    store: S,
    /// Bearer token verifier
    verifier: V,
    /// Environment (time, RNG)
    env: E,
    /// Gateway configuration
    config: GatewayConfig,
}

impl<E, S, V> ChatGateway<E, S, V>
where
    E: Environment,
    S: MessageStore,
    V: TokenVerifier,
{
    /// Create a gateway with its own room registry.
    pub fn new(env: E, store: S, verifier: V, config: GatewayConfig) -> Self {
        Self::with_rooms(env, store, verifier, config, RoomRegistry::shared())
    }

    /// Create a gateway over an existing shared registry.
    pub fn with_rooms(
        env: E,
        store: S,
        verifier: V,
        config: GatewayConfig,
        rooms: SharedRooms,
    ) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), rooms, store, verifier, env, config }
    }

    /// Process a gateway event and return actions to execute.
    ///
    /// Per-event rejections are not errors: they come back as a `Log` action
    /// plus, when enabled, an `error` reply. `Err` is reserved for runtime
    /// bookkeeping bugs such as a reused session id.
    pub async fn process_event(
        &self,
        event: GatewayEvent,
    ) -> Result<Vec<GatewayAction>, GatewayError> {
        match event {
            GatewayEvent::ConnectionOpened { session_id } => {
                self.handle_connection_opened(session_id).await
            },
            GatewayEvent::FrameReceived { session_id, text } => {
                Ok(self.handle_frame_received(session_id, &text).await)
            },
            GatewayEvent::EventReceived { session_id, event } => {
                Ok(self.handle_client_event(session_id, event).await)
            },
            GatewayEvent::ConnectionClosed { session_id, reason } => {
                Ok(self.handle_connection_closed(session_id, &reason).await)
            },
        }
    }

    /// Shared room registry.
    pub fn rooms(&self) -> SharedRooms {
        SharedRooms::clone(&self.rooms)
    }

    /// Message store backend.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Gateway configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Number of non-empty rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.room_count()
    }

    /// Sessions currently joined to `room_id`.
    pub async fn members_of(&self, room_id: &RoomId) -> Vec<u64> {
        self.rooms.read().await.members_of(room_id)
    }

    /// State of a session. `None` once the session is gone.
    pub async fn session_state(&self, session_id: u64) -> Option<SessionState> {
        self.sessions.lock().await.get(&session_id).map(|s| s.state().clone())
    }

    /// Every live session with its joined rooms, ordered by session id.
    pub async fn session_views(&self) -> Vec<SessionView> {
        let sessions = self.sessions.lock().await;
        let mut views: Vec<_> = sessions
            .values()
            .map(|s| SessionView {
                session_id: s.session_id(),
                state: s.state().clone(),
                joined: s.joined_rooms().cloned().collect(),
            })
            .collect();
        views.sort_unstable_by_key(|v| v.session_id);
        views
    }

    /// Verify a bearer token.
    ///
    /// # Errors
    ///
    /// - `GatewayError::InvalidToken` for any rejected token
    pub fn verify_token(&self, token: &str) -> Result<UserId, GatewayError> {
        Ok(self.verifier.validate(token)?)
    }

    /// Full history of a room, ascending.
    ///
    /// # Errors
    ///
    /// - `GatewayError::Storage` if the store fails
    pub async fn room_history(&self, room_id: &RoomId) -> Result<Vec<ChatMessage>, GatewayError> {
        let room_id = room_id.clone();
        Ok(self.store_call(move |store| store.history(&room_id)).await?)
    }

    /// Delete `message_id` on behalf of `user_id`.
    ///
    /// Returns the broadcast to execute. Shared by the socket and HTTP paths
    /// so both enforce the same ownership rule.
    ///
    /// # Errors
    ///
    /// - `GatewayError::MessageNotFound` if the message does not exist
    /// - `GatewayError::NotSender` if `user_id` did not send it
    /// - `GatewayError::Storage` if the store fails
    pub async fn delete_message_as(
        &self,
        user_id: &UserId,
        message_id: MessageId,
    ) -> Result<Vec<GatewayAction>, GatewayError> {
        let message = self
            .store_call(move |store| store.find_by_id(message_id))
            .await?
            .ok_or(GatewayError::MessageNotFound(message_id))?;

        if &message.sender != user_id {
            return Err(GatewayError::NotSender { message_id, user_id: user_id.clone() });
        }

        let removed = match self.store_call(move |store| store.delete_by_id(message_id)).await {
            Ok(removed) => removed,
            Err(StorageError::MessageNotFound(_)) => {
                // Lost a race with another delete by the same sender; that
                // delete already broadcast.
                return Ok(vec![GatewayAction::Log {
                    level: LogLevel::Debug,
                    message: format!("message {message_id} already deleted"),
                }]);
            },
            Err(e) => return Err(e.into()),
        };

        Ok(vec![
            GatewayAction::BroadcastToRoom {
                room_id: removed.room_id.clone(),
                event: ServerEvent::MessageDeleted(removed.id),
            },
            GatewayAction::Log {
                level: LogLevel::Info,
                message: format!(
                    "user {user_id} deleted message {message_id} in room {}",
                    removed.room_id
                ),
            },
        ])
    }

    /// Handle a new connection being accepted.
    async fn handle_connection_opened(
        &self,
        session_id: u64,
    ) -> Result<Vec<GatewayAction>, GatewayError> {
        let mut sessions = self.sessions.lock().await;

        if sessions.len() >= self.config.max_connections {
            return Ok(vec![
                GatewayAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "refusing session {session_id}: {} connections open",
                        sessions.len()
                    ),
                },
                GatewayAction::CloseConnection {
                    session_id,
                    reason: "max connections exceeded".to_string(),
                },
            ]);
        }

        if sessions.contains_key(&session_id) {
            return Err(GatewayError::SessionAlreadyExists(session_id));
        }

        sessions.insert(session_id, ConnectionSession::new(session_id));

        Ok(vec![GatewayAction::Log {
            level: LogLevel::Debug,
            message: format!("session {session_id} opened"),
        }])
    }

    /// Decode a raw frame and dispatch it.
    async fn handle_frame_received(&self, session_id: u64, text: &str) -> Vec<GatewayAction> {
        match ClientEvent::decode(text) {
            Ok(event) => self.handle_client_event(session_id, event).await,
            Err(e) => {
                let err = if self.sessions.lock().await.contains_key(&session_id) {
                    GatewayError::from(e)
                } else {
                    GatewayError::SessionNotFound(session_id)
                };
                self.finish(session_id, "frame", Err(err))
            },
        }
    }

    /// Dispatch a decoded client event.
    async fn handle_client_event(
        &self,
        session_id: u64,
        event: ClientEvent,
    ) -> Vec<GatewayAction> {
        let name = event.name();

        let result = match event {
            ClientEvent::Authenticate(payload) => {
                return self.handle_authenticate(session_id, &payload.access_token).await;
            },
            ClientEvent::JoinRoom(payload) => self.handle_join(session_id, payload.room_id).await,
            ClientEvent::LeaveRoom(payload) => {
                self.handle_leave(session_id, &payload.room_id).await
            },
            ClientEvent::Message(payload) => {
                self.handle_send(session_id, payload.room_id, payload.content).await
            },
            ClientEvent::DeleteMessage(message_id) => {
                self.handle_delete(session_id, message_id).await
            },
        };

        self.finish(session_id, name, result)
    }

    /// Authenticate a session. A rejected token closes the connection.
    ///
    /// The token is verified without holding the sessions lock; the state is
    /// re-checked once the lock is taken again.
    async fn handle_authenticate(&self, session_id: u64, token: &str) -> Vec<GatewayAction> {
        if let Err(err) = self.check_unauthenticated(session_id).await {
            return self.finish(session_id, "authenticate", Err(err));
        }

        let verified = self.verifier.validate(token);

        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&session_id) else {
            return self.finish(
                session_id,
                "authenticate",
                Err(GatewayError::SessionNotFound(session_id)),
            );
        };

        let user_id = match verified {
            Ok(user_id) => user_id,
            Err(e) => {
                session.close();
                sessions.remove(&session_id);

                let err = GatewayError::from(e);
                let mut actions = self.finish(session_id, "authenticate", Err(err));
                actions.push(GatewayAction::CloseConnection {
                    session_id,
                    reason: "invalid token".to_string(),
                });
                return actions;
            },
        };

        if let Err(e) = session.authenticate(user_id.clone()) {
            return self.finish(session_id, "authenticate", Err(e.into()));
        }

        vec![
            GatewayAction::SendToSession {
                session_id,
                event: ServerEvent::Authenticated(AuthenticatedPayload {
                    user_id: user_id.clone(),
                }),
            },
            GatewayAction::Log {
                level: LogLevel::Info,
                message: format!("session {session_id} authenticated as {user_id}"),
            },
        ]
    }

    /// Fail unless the session exists and has no identity yet.
    async fn check_unauthenticated(&self, session_id: u64) -> Result<(), GatewayError> {
        let sessions = self.sessions.lock().await;
        let session = sessions.get(&session_id).ok_or(GatewayError::SessionNotFound(session_id))?;

        match session.state() {
            SessionState::Authenticated { user_id } => {
                Err(GatewayError::Session(SessionError::AlreadyAuthenticated {
                    user_id: user_id.clone(),
                }))
            },
            SessionState::Unauthenticated | SessionState::Closed => Ok(()),
        }
    }

    /// Join a room and reply with its history.
    ///
    /// Membership is registered before history is read, so a message
    /// persisted concurrently reaches the joiner live, in history, or both,
    /// but never neither.
    async fn handle_join(
        &self,
        session_id: u64,
        room_id: RoomId,
    ) -> Result<Vec<GatewayAction>, GatewayError> {
        let newly_joined = {
            let mut sessions = self.sessions.lock().await;
            let session =
                sessions.get_mut(&session_id).ok_or(GatewayError::SessionNotFound(session_id))?;

            session.require_user("join room")?;
            if room_id.is_empty() {
                return Err(GatewayError::InvalidPayload("groupId must not be empty".to_string()));
            }

            let newly_joined = session.join(room_id.clone())?;
            self.rooms.write().await.join(&room_id, session_id);
            newly_joined
        };

        let history = {
            let room_id = room_id.clone();
            self.store_call(move |store| store.history(&room_id)).await
        };

        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&session_id) else {
            return Err(GatewayError::SessionNotFound(session_id));
        };

        let history = match history {
            Ok(history) => history,
            Err(e) => {
                if newly_joined {
                    session.leave(&room_id)?;
                    self.rooms.write().await.leave(&room_id, session_id);
                }
                return Err(e.into());
            },
        };

        if !session.has_joined(&room_id) {
            // Left the room while history was loading.
            return Ok(vec![GatewayAction::Log {
                level: LogLevel::Debug,
                message: format!("session {session_id} left {room_id} before history arrived"),
            }]);
        }

        let count = history.len();
        Ok(vec![
            GatewayAction::SendToSession { session_id, event: ServerEvent::ChatHistory(history) },
            GatewayAction::Log {
                level: LogLevel::Debug,
                message: format!("session {session_id} joined {room_id} ({count} messages)"),
            },
        ])
    }

    /// Leave a room. Leaving a room never joined is a no-op.
    async fn handle_leave(
        &self,
        session_id: u64,
        room_id: &RoomId,
    ) -> Result<Vec<GatewayAction>, GatewayError> {
        let mut sessions = self.sessions.lock().await;
        let session =
            sessions.get_mut(&session_id).ok_or(GatewayError::SessionNotFound(session_id))?;

        let was_joined = session.leave(room_id)?;
        self.rooms.write().await.leave(room_id, session_id);

        Ok(vec![GatewayAction::Log {
            level: LogLevel::Debug,
            message: if was_joined {
                format!("session {session_id} left {room_id}")
            } else {
                format!("session {session_id} left {room_id} (not joined)")
            },
        }])
    }

    /// Persist a message, then broadcast it to the room.
    ///
    /// The sender does not need to have joined the room; if it has, it
    /// receives its own message through the broadcast.
    async fn handle_send(
        &self,
        session_id: u64,
        room_id: RoomId,
        content: String,
    ) -> Result<Vec<GatewayAction>, GatewayError> {
        let sender = {
            let sessions = self.sessions.lock().await;
            let session =
                sessions.get(&session_id).ok_or(GatewayError::SessionNotFound(session_id))?;
            session.require_user("send message")?.clone()
        };

        if room_id.is_empty() {
            return Err(GatewayError::InvalidPayload("groupId must not be empty".to_string()));
        }
        if content.is_empty() {
            return Err(GatewayError::InvalidPayload("content must not be empty".to_string()));
        }
        if content.len() > self.config.max_message_len {
            return Err(GatewayError::InvalidPayload(format!(
                "content is {} bytes, limit is {}",
                content.len(),
                self.config.max_message_len
            )));
        }

        let now_millis = self.env.wall_clock_millis();
        let message = {
            let room_id = room_id.clone();
            let sender = sender.clone();
            self.store_call(move |store| store.append(&room_id, &sender, &content, now_millis))
                .await?
        };

        let id = message.id;
        Ok(vec![
            GatewayAction::BroadcastToRoom {
                room_id: room_id.clone(),
                event: ServerEvent::Message(message),
            },
            GatewayAction::Log {
                level: LogLevel::Debug,
                message: format!("session {session_id} ({sender}) sent {id} to {room_id}"),
            },
        ])
    }

    /// Delete a message the session's user sent.
    async fn handle_delete(
        &self,
        session_id: u64,
        message_id: MessageId,
    ) -> Result<Vec<GatewayAction>, GatewayError> {
        let user_id = {
            let sessions = self.sessions.lock().await;
            let session =
                sessions.get(&session_id).ok_or(GatewayError::SessionNotFound(session_id))?;
            session.require_user("delete message")?.clone()
        };

        self.delete_message_as(&user_id, message_id).await
    }

    /// Tear down a session: leave every room and forget it.
    async fn handle_connection_closed(
        &self,
        session_id: u64,
        reason: &str,
    ) -> Vec<GatewayAction> {
        let mut sessions = self.sessions.lock().await;

        let Some(mut session) = sessions.remove(&session_id) else {
            return vec![GatewayAction::Log {
                level: LogLevel::Debug,
                message: format!("session {session_id} closed ({reason}), already cleaned up"),
            }];
        };

        let joined = session.close();
        let left = self.rooms.write().await.leave_all(session_id);
        debug_assert_eq!(joined.len(), left.len());

        vec![GatewayAction::Log {
            level: LogLevel::Info,
            message: format!("session {session_id} closed ({reason}), left {} rooms", left.len()),
        }]
    }

    /// Turn a handler result into actions.
    ///
    /// Rejections are logged with the session id and, when enabled, echoed
    /// to the requester only. A session that vanished mid-event gets nothing.
    fn finish(
        &self,
        session_id: u64,
        operation: &str,
        result: Result<Vec<GatewayAction>, GatewayError>,
    ) -> Vec<GatewayAction> {
        let err = match result {
            Ok(actions) => return actions,
            Err(err) => err,
        };

        if let GatewayError::SessionNotFound(_) = err {
            return vec![GatewayAction::Log {
                level: LogLevel::Debug,
                message: format!("session {session_id} gone, dropping {operation}"),
            }];
        }

        let level = match &err {
            GatewayError::Storage(_) | GatewayError::SessionAlreadyExists(_) => LogLevel::Error,
            _ => LogLevel::Warn,
        };

        let mut actions = vec![GatewayAction::Log {
            level,
            message: format!("session {session_id}: rejected {operation}: {err}"),
        }];

        if self.config.error_replies {
            actions.push(GatewayAction::SendToSession {
                session_id,
                event: ServerEvent::error(err.code(), err.reply_message()),
            });
        }

        actions
    }

    /// Run a store call on the blocking pool.
    async fn store_call<T, F>(&self, call: F) -> Result<T, StorageError>
    where
        F: FnOnce(S) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || call(store))
            .await
            .map_err(|e| StorageError::Io(format!("storage task failed: {e}")))?
    }
}
