//! Line-Based Chat Server Library
//!
//! A minimal multi-client TCP chat server built on tokio. Clients pick a
//! unique nickname, then every line they send is broadcast to all other
//! registered clients.
//!
//! # Protocol
//! - On connect the server prompts for a nickname
//! - The first non-empty line claims a nickname (exact, case-sensitive);
//!   a taken nickname is rejected and the client is prompted again
//! - Every later non-empty line is sent to the others as `nick: text\r\n`
//! - When a client leaves, the others get a departure notice
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the client registry
//! - Each connection has a `handler` task communicating with the server
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use line_chat_server::{serve, ChatServer, ConnectionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:3000").await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(ChatServer::new(cmd_rx).run());
//!
//!     serve(listener, cmd_tx, ConnectionConfig::default(), async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//! }
//! ```

pub mod broadcast;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use broadcast::{broadcast, BroadcastReport};
pub use client::Client;
pub use codec::LineCodec;
pub use config::ConnectionConfig;
pub use dispatcher::serve;
pub use error::{AppError, CodecError, RegistryError, SendError};
pub use handler::handle_connection;
pub use message::ServerMessage;
pub use registry::ClientRegistry;
pub use server::{ChatServer, ServerCommand};
pub use session::{SessionAction, SessionState};
pub use types::ClientId;
