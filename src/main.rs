//! Line-Based Chat Server - Entry Point
//!
//! Starts the TCP listener and ChatServer actor, accepting connections
//! until Ctrl-C.

use std::env;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use line_chat_server::registry::DEFAULT_MAX_CLIENTS;
use line_chat_server::{serve, ChatServer, ConnectionConfig};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:3000";

/// Channel buffer size for server commands
const CHANNEL_BUFFER_SIZE: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("line_chat_server=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    // Start TCP listener
    let listener = TcpListener::bind(&addr).await?;
    info!("Chat server listening on {}", addr);

    // Create ChatServer actor channel and start
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
    let server = ChatServer::with_max_clients(cmd_rx, DEFAULT_MAX_CLIENTS);
    tokio::spawn(server.run());

    info!("ChatServer actor started");

    serve(listener, cmd_tx, ConnectionConfig::default(), shutdown_signal()).await;

    info!("Chat server stopped");
    Ok(())
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
