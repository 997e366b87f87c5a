//! Error types for the chat server
//!
//! Defines connection-level errors, registry errors, outbound send errors
//! and line framing errors. Uses thiserror for ergonomic error definitions.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::types::ClientId;

/// Connection-level errors
///
/// All of these are fatal for the affected connection only.
#[derive(Debug, Error)]
pub enum AppError {
    /// Line framing error (fatal)
    #[error("Framing error: {0}")]
    Codec(#[from] CodecError),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// A connection task panicked or was cancelled
    #[error("Connection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Client registry errors
///
/// `NicknameTaken` is recoverable (the client is re-prompted). Capacity and
/// allocation failures drop the affected connection.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Another registered client already holds this nickname
    #[error("Nickname already taken: {0}")]
    NicknameTaken(String),

    /// No client with this identity is connected
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    /// The client already has a nickname
    #[error("Client {0} is already registered")]
    AlreadyRegistered(ClientId),

    /// A client with this identity already exists
    #[error("Duplicate client identity: {0}")]
    DuplicateIdentity(ClientId),

    /// The registry holds its maximum number of clients
    #[error("Client limit of {0} reached")]
    CapacityExceeded(usize),

    /// Memory for a new entry could not be reserved
    #[error("Allocation failure: {0}")]
    AllocationFailure(#[from] TryReserveError),
}

/// Message send errors
///
/// Occurs when a client's outbound queue cannot accept a message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The client is not draining its queue fast enough
    #[error("Outbound queue full")]
    QueueFull,
}

/// Line codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// A line grew past the configured maximum without a terminator
    #[error("line exceeds maximum length ({0} bytes)")]
    LineTooLong(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
