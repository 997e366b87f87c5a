//! Accept loop
//!
//! Takes connections off the listener and spawns a handler for each one
//! until the shutdown future resolves. With no clients connected it simply
//! waits on the listener.

use std::future::Future;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::ConnectionConfig;
use crate::handler::handle_connection;
use crate::server::ServerCommand;

/// Accept connections until `shutdown` completes
pub async fn serve<F>(
    listener: TcpListener,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: ConnectionConfig,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let cmd_tx = cmd_tx.clone();
                    let config = config.clone();

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, cmd_tx, config).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
