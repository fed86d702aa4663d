//! Study-room chat server binary.
//!
//! # Usage
//!
//! ```bash
//! # In-memory storage (development)
//! JWT_SECRET=dev studyroom-server --bind 127.0.0.1:3000
//!
//! # Durable storage
//! studyroom-server --bind 0.0.0.0:3000 --db chat.redb --jwt-secret "$JWT_SECRET"
//! ```

use std::path::PathBuf;

use clap::Parser;
use studyroom_server::{
    GatewayConfig, MemoryStorage, MessageStore, RedbStorage, Server, ServerRuntimeConfig,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Study-room chat server
#[derive(Parser, Debug)]
#[command(name = "studyroom-server")]
#[command(about = "Realtime study-group chat server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:3000")]
    bind: String,

    /// Path to the redb message database (in-memory if omitted)
    #[arg(long)]
    db: Option<PathBuf>,

    /// HS256 secret used to verify access tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Maximum message length in bytes
    #[arg(long, default_value = "4096")]
    max_message_len: usize,

    /// Per-connection outbound queue length
    #[arg(long, default_value = "256")]
    outbound_capacity: usize,

    /// Do not send `error` events back to clients
    #[arg(long)]
    quiet_errors: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Study-room server starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        db_path: args.db,
        jwt_secret: args.jwt_secret,
        gateway: GatewayConfig {
            max_connections: args.max_connections,
            max_message_len: args.max_message_len,
            error_replies: !args.quiet_errors,
        },
        outbound_capacity: args.outbound_capacity,
    };

    match config.db_path.clone() {
        Some(path) => {
            tracing::info!("Using redb storage at {}", path.display());
            serve(config, RedbStorage::open(&path)?).await
        },
        None => {
            tracing::warn!("No --db given - messages are kept in memory only");
            serve(config, MemoryStorage::new()).await
        },
    }
}

async fn serve<S: MessageStore>(
    config: ServerRuntimeConfig,
    store: S,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::bind(config, store).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
