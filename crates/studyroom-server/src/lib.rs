//! Study-room chat server.
//!
//! Production runtime around the chat gateway: axum for HTTP and WebSocket,
//! Tokio for the async runtime, and system time with cryptographic RNG.
//!
//! # Architecture
//!
//! The [`ChatGateway`] is action-based: it owns session records and the room
//! index, calls the [`MessageStore`], and returns [`GatewayAction`]s. The
//! [`Dispatcher`] executes those actions against per-connection outbound
//! channels. [`Server`] wires both into an axum router.
//!
//! # Components
//!
//! - [`ChatGateway`]: session state machine, room membership, persistence
//! - [`Dispatcher`]: single-session sends and room broadcasts
//! - [`RoomRegistry`]: room ↔ session index
//! - [`storage`]: memory, redb, and fault-injecting message stores
//! - [`JwtVerifier`]: bearer token verification
//! - [`SystemEnv`]: production environment (real time, crypto RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod dispatcher;
mod error;
mod gateway;
mod gateway_error;
pub mod http;
mod registry;
mod socket;
pub mod storage;
mod system_env;

use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

pub use auth::{AuthError, Claims, JwtVerifier, TokenVerifier};
pub use dispatcher::{Dispatcher, Outbound};
pub use error::ServerError;
pub use gateway::{
    ChatGateway, GatewayAction, GatewayConfig, GatewayEvent, LogLevel, SessionView,
};
pub use gateway_error::GatewayError;
pub use registry::{RoomRegistry, SharedRooms};
pub use storage::{ChaoticStorage, MemoryStorage, MessageStore, RedbStorage, StorageError};
pub use system_env::SystemEnv;
use tokio::net::TcpListener;

/// Gateway as run in production.
pub type Gateway<S> = ChatGateway<SystemEnv, S, JwtVerifier>;

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:3000")
    pub bind_address: String,
    /// Path to the redb database; in-memory storage when `None`
    pub db_path: Option<PathBuf>,
    /// HS256 secret for access tokens
    pub jwt_secret: String,
    /// Gateway configuration (limits, error replies)
    pub gateway: GatewayConfig,
    /// Per-connection outbound queue length
    pub outbound_capacity: usize,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            db_path: None,
            jwt_secret: String::new(),
            gateway: GatewayConfig::default(),
            outbound_capacity: 256,
        }
    }
}

/// Shared state handed to every request and connection.
pub struct AppState<S: MessageStore> {
    gateway: Arc<Gateway<S>>,
    dispatcher: Arc<Dispatcher>,
    next_session_id: Arc<AtomicU64>,
    outbound_capacity: usize,
}

impl<S: MessageStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            dispatcher: Arc::clone(&self.dispatcher),
            next_session_id: Arc::clone(&self.next_session_id),
            outbound_capacity: self.outbound_capacity,
        }
    }
}

impl<S: MessageStore> AppState<S> {
    /// Build gateway and dispatcher over one shared room registry.
    pub fn new(
        store: S,
        verifier: JwtVerifier,
        config: GatewayConfig,
        outbound_capacity: usize,
    ) -> Self {
        let rooms = RoomRegistry::shared();
        let gateway = ChatGateway::with_rooms(
            SystemEnv::new(),
            store,
            verifier,
            config,
            Arc::clone(&rooms),
        );

        Self {
            gateway: Arc::new(gateway),
            dispatcher: Arc::new(Dispatcher::new(rooms)),
            next_session_id: Arc::new(AtomicU64::new(1)),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// The chat gateway.
    pub fn gateway(&self) -> &Gateway<S> {
        &self.gateway
    }

    /// The outbound dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Session id for a new connection. Never reused within this process.
    pub(crate) fn allocate_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Production chat server.
///
/// Wraps the gateway with an axum router on a bound TCP listener.
pub struct Server<S: MessageStore> {
    listener: TcpListener,
    state: AppState<S>,
}

impl<S: MessageStore> Server<S> {
    /// Create and bind a new server over `store`.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if the JWT secret is empty or the address
    ///   cannot be bound
    pub async fn bind(config: ServerRuntimeConfig, store: S) -> Result<Self, ServerError> {
        let verifier = JwtVerifier::new(&config.jwt_secret)?;

        let listener = TcpListener::bind(&config.bind_address).await.map_err(|e| {
            ServerError::Config(format!("cannot bind {}: {e}", config.bind_address))
        })?;

        let state = AppState::new(store, verifier, config.gateway, config.outbound_capacity);

        Ok(Self { listener, state })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared state (for inspection in tests).
    pub fn state(&self) -> &AppState<S> {
        &self.state
    }

    /// Serve until the listener fails.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server starting on {}", self.local_addr()?);

        axum::serve(self.listener, http::router(self.state)).await?;

        Ok(())
    }
}
