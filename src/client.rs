//! Client struct definition
//!
//! Represents a connected client with its session state and outbound queue.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::SendError;
use crate::session::SessionState;
use crate::types::ClientId;

/// Placeholder used in departure notices for clients without a nickname
pub const UNKNOWN_NICKNAME: &str = "unknown";

/// Connected client information
///
/// Holds all state related to a connected client: its identity, nickname,
/// session state, and the queue of wire text waiting to be written to it.
#[derive(Debug)]
pub struct Client {
    /// Unique identifier for this client
    pub id: ClientId,
    /// Remote address, for logging
    pub peer_addr: SocketAddr,
    /// Nickname (None before registration)
    pub nickname: Option<String>,
    /// Session state
    pub state: SessionState,
    /// Server → Client outbound queue
    pub sender: mpsc::Sender<Bytes>,
    /// Registration order, used to list users stably
    pub(crate) joined: u64,
}

impl Client {
    /// Create a new unregistered client
    pub fn new(id: ClientId, peer_addr: SocketAddr, sender: mpsc::Sender<Bytes>) -> Self {
        Self {
            id,
            peer_addr,
            nickname: None,
            state: SessionState::Unregistered,
            sender,
            joined: 0,
        }
    }

    /// Queue wire text for this client without waiting
    ///
    /// Fails if the client's queue is full (slow reader) or closed
    /// (connection gone).
    pub fn send(&self, wire: Bytes) -> Result<(), SendError> {
        self.sender.try_send(wire).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Get the display name for this client
    ///
    /// Returns the nickname if set, otherwise "unknown".
    pub fn display_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(UNKNOWN_NICKNAME)
    }

    /// Check if this client holds a nickname
    pub fn is_registered(&self) -> bool {
        self.state.is_registered()
    }

    /// Assign the nickname and enter the Registered state
    pub(crate) fn set_nickname(&mut self, nickname: String, joined: u64) {
        self.nickname = Some(nickname);
        self.state = SessionState::Registered;
        self.joined = joined;
    }
}
