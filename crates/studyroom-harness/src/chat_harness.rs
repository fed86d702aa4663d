//! In-process chat runtime for tests.
//!
//! `ChatHarness` plays the role of the socket runtime: it assigns session
//! ids, feeds [`GatewayEvent`]s to a real [`ChatGateway`], and executes the
//! returned actions through a real [`Dispatcher`]. Instead of sockets, each
//! connection gets an outbound channel whose frames are decoded back into
//! [`ServerEvent`]s, so tests assert on exactly what a client would receive.
//!
//! Everything runs on the caller's task. There is no background work, so
//! delivery order is fully determined by the order of calls.

use std::collections::{BTreeSet, HashMap};

use studyroom_proto::{
    AuthenticatePayload, ClientEvent, MessageId, RoomId, RoomPayload, SendMessagePayload,
    ServerEvent,
};
use studyroom_server::{
    ChatGateway, Dispatcher, GatewayAction, GatewayConfig, GatewayError, GatewayEvent,
    MemoryStorage, MessageStore, Outbound,
};
use tokio::sync::mpsc;

use crate::{
    SimEnv, StaticTokenVerifier,
    invariants::{SessionSnapshot, SystemSnapshot},
};

/// Gateway as run by the harness.
pub type HarnessGateway<S> = ChatGateway<SimEnv, S, StaticTokenVerifier>;

/// Outbound queue length per simulated connection.
const INBOX_CAPACITY: usize = 1024;

/// Client side of one simulated connection.
struct SimConnection {
    receiver: mpsc::Receiver<Outbound>,
    received: Vec<ServerEvent>,
    close_reason: Option<String>,
}

/// Deterministic in-process runtime around a gateway.
pub struct ChatHarness<S: MessageStore = MemoryStorage> {
    gateway: HarnessGateway<S>,
    dispatcher: Dispatcher,
    env: SimEnv,
    verifier: StaticTokenVerifier,
    connections: HashMap<u64, SimConnection>,
    /// Rooms any message was sent to, for history snapshots
    touched_rooms: BTreeSet<RoomId>,
    next_session_id: u64,
}

impl ChatHarness<MemoryStorage> {
    /// Harness over in-memory storage with default configuration.
    pub fn new() -> Self {
        Self::with_store(MemoryStorage::new(), GatewayConfig::default(), 0)
    }

    /// Harness over in-memory storage with a custom configuration.
    pub fn with_config(config: GatewayConfig) -> Self {
        Self::with_store(MemoryStorage::new(), config, 0)
    }
}

impl Default for ChatHarness<MemoryStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: MessageStore> ChatHarness<S> {
    /// Harness over `store`, seeding the environment with `seed`.
    pub fn with_store(store: S, config: GatewayConfig, seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let verifier = StaticTokenVerifier::new();
        let gateway = ChatGateway::new(env.clone(), store, verifier.clone(), config);
        let dispatcher = Dispatcher::new(gateway.rooms());

        Self {
            gateway,
            dispatcher,
            env,
            verifier,
            connections: HashMap::new(),
            touched_rooms: BTreeSet::new(),
            next_session_id: 1,
        }
    }

    /// Open a connection and return its session id.
    ///
    /// A connection refused by the gateway is still returned; its inbox
    /// holds the close reason.
    pub async fn connect(&mut self) -> Result<u64, GatewayError> {
        let session_id = self.next_session_id;
        self.next_session_id += 1;

        let (sender, receiver) = mpsc::channel(INBOX_CAPACITY);
        self.dispatcher.register(session_id, sender).await;
        self.connections.insert(
            session_id,
            SimConnection { receiver, received: Vec::new(), close_reason: None },
        );

        let actions =
            self.gateway.process_event(GatewayEvent::ConnectionOpened { session_id }).await?;
        self.execute(actions).await;

        Ok(session_id)
    }

    /// Open a connection and authenticate it as `user_id`.
    pub async fn connect_as(&mut self, user_id: &str) -> Result<u64, GatewayError> {
        let session_id = self.connect().await?;
        self.authenticate(session_id, user_id).await?;
        Ok(session_id)
    }

    /// Authenticate with a token registered for `user_id`.
    pub async fn authenticate(
        &mut self,
        session_id: u64,
        user_id: &str,
    ) -> Result<(), GatewayError> {
        let token = self.verifier.register(user_id);
        self.authenticate_with_token(session_id, &token).await
    }

    /// Authenticate with an arbitrary token.
    pub async fn authenticate_with_token(
        &mut self,
        session_id: u64,
        token: &str,
    ) -> Result<(), GatewayError> {
        let payload = AuthenticatePayload { access_token: token.to_string() };
        self.send_event(session_id, ClientEvent::Authenticate(payload)).await
    }

    /// `joinRoom`
    pub async fn join(&mut self, session_id: u64, room_id: &str) -> Result<(), GatewayError> {
        let payload = RoomPayload { room_id: RoomId::new(room_id) };
        self.send_event(session_id, ClientEvent::JoinRoom(payload)).await
    }

    /// `leaveRoom`
    pub async fn leave(&mut self, session_id: u64, room_id: &str) -> Result<(), GatewayError> {
        let payload = RoomPayload { room_id: RoomId::new(room_id) };
        self.send_event(session_id, ClientEvent::LeaveRoom(payload)).await
    }

    /// `message`
    pub async fn send_message(
        &mut self,
        session_id: u64,
        room_id: &str,
        content: &str,
    ) -> Result<(), GatewayError> {
        let payload =
            SendMessagePayload { room_id: RoomId::new(room_id), content: content.to_string() };
        self.send_event(session_id, ClientEvent::Message(payload)).await
    }

    /// `deleteMessage`
    pub async fn delete_message(
        &mut self,
        session_id: u64,
        message_id: MessageId,
    ) -> Result<(), GatewayError> {
        self.send_event(session_id, ClientEvent::DeleteMessage(message_id)).await
    }

    /// Deliver a typed event from `session_id`.
    pub async fn send_event(
        &mut self,
        session_id: u64,
        event: ClientEvent,
    ) -> Result<(), GatewayError> {
        if let ClientEvent::Message(payload) = &event {
            self.touched_rooms.insert(payload.room_id.clone());
        }

        let actions =
            self.gateway.process_event(GatewayEvent::EventReceived { session_id, event }).await?;
        self.execute(actions).await;
        Ok(())
    }

    /// Deliver a raw text frame from `session_id`.
    pub async fn send_frame(&mut self, session_id: u64, text: &str) -> Result<(), GatewayError> {
        let event = GatewayEvent::FrameReceived { session_id, text: text.to_string() };
        let actions = self.gateway.process_event(event).await?;
        self.execute(actions).await;
        Ok(())
    }

    /// Close a connection from the client side.
    ///
    /// Events already queued for it stay readable through [`Self::take_inbox`].
    pub async fn disconnect(&mut self, session_id: u64) -> Result<(), GatewayError> {
        let event =
            GatewayEvent::ConnectionClosed { session_id, reason: "client disconnected".into() };
        let actions = self.gateway.process_event(event).await?;
        self.execute(actions).await;
        self.dispatcher.unregister(session_id).await;
        Ok(())
    }

    /// Drain and return everything delivered to `session_id` so far.
    pub fn take_inbox(&mut self, session_id: u64) -> Vec<ServerEvent> {
        self.drain(session_id);
        self.connections
            .get_mut(&session_id)
            .map(|conn| std::mem::take(&mut conn.received))
            .unwrap_or_default()
    }

    /// Reason given when the server closed `session_id`, if it did.
    pub fn close_reason(&mut self, session_id: u64) -> Option<String> {
        self.drain(session_id);
        self.connections.get(&session_id).and_then(|conn| conn.close_reason.clone())
    }

    /// Clear every inbox.
    pub fn clear_inboxes(&mut self) {
        let ids: Vec<u64> = self.connections.keys().copied().collect();
        for session_id in ids {
            self.take_inbox(session_id);
        }
    }

    /// Capture observable state for invariant checks.
    pub async fn snapshot(&self) -> Result<SystemSnapshot, GatewayError> {
        let sessions = self
            .gateway
            .session_views()
            .await
            .into_iter()
            .map(|view| SessionSnapshot {
                session_id: view.session_id,
                state: view.state,
                joined: view.joined.into_iter().collect(),
            })
            .collect();

        let memberships = {
            let rooms = self.gateway.rooms();
            let rooms = rooms.read().await;
            rooms.memberships().map(|(room, session)| (room.clone(), session)).collect()
        };

        let mut histories = std::collections::BTreeMap::new();
        for room_id in &self.touched_rooms {
            histories.insert(room_id.clone(), self.gateway.room_history(room_id).await?);
        }

        Ok(SystemSnapshot { sessions, memberships, histories })
    }

    /// The gateway under test.
    pub fn gateway(&self) -> &HarnessGateway<S> {
        &self.gateway
    }

    /// The dispatcher executing gateway actions.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Shared simulated environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Shared token table.
    pub fn verifier(&self) -> &StaticTokenVerifier {
        &self.verifier
    }

    async fn execute(&mut self, actions: Vec<GatewayAction>) {
        for session_id in self.dispatcher.execute(actions).await {
            self.drain(session_id);
        }
    }

    fn drain(&mut self, session_id: u64) {
        let Some(conn) = self.connections.get_mut(&session_id) else {
            return;
        };

        while let Ok(frame) = conn.receiver.try_recv() {
            match frame {
                Outbound::Text(text) => match ServerEvent::decode(&text) {
                    Ok(event) => conn.received.push(event),
                    Err(e) => tracing::error!(session_id, error = %e, "undecodable frame"),
                },
                Outbound::Close(reason) => conn.close_reason = Some(reason),
            }
        }
    }
}
