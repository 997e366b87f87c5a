//! Message protocol definitions
//!
//! Line-oriented text protocol. Every server → client message is rendered
//! once into wire text (`Bytes`) that can be cheaply shared by all
//! recipients of a broadcast.

use std::fmt;

use bytes::Bytes;

use crate::error::RegistryError;

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Sent on connect, asks for a nickname
    Prompt,
    /// Requested nickname is in use, asks again
    NicknameTaken,
    /// Registration succeeded; names of the other online users
    Welcome { others: Vec<String> },
    /// Chat line from another user
    Chat { from: String, content: String },
    /// A client left (nickname or placeholder)
    Left { nickname: String },
    /// Connection refused for lack of resources
    ServerFull,
}

impl ServerMessage {
    /// Render the message into wire text
    pub fn to_wire(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Prompt => write!(f, "Welcome! Enter your nickname:\r\n> "),
            ServerMessage::NicknameTaken => {
                write!(f, "Error: nickname already taken, choose another:\r\n> ")
            }
            ServerMessage::Welcome { others } if others.is_empty() => {
                write!(f, "Welcome! You are the only user here.\r\n")
            }
            ServerMessage::Welcome { others } => {
                let noun = if others.len() == 1 { "user" } else { "users" };
                write!(
                    f,
                    "Welcome! {} other {} online: {}\r\n",
                    others.len(),
                    noun,
                    others.join(", ")
                )
            }
            ServerMessage::Chat { from, content } => write!(f, "{}: {}\r\n", from, content),
            ServerMessage::Left { nickname } => {
                write!(f, "User '{}' left the chat.\r\n", nickname)
            }
            ServerMessage::ServerFull => {
                write!(f, "Error: server is full, try again later.\r\n")
            }
        }
    }
}

/// Convert a RegistryError to the ServerMessage the affected client sees
impl From<&RegistryError> for ServerMessage {
    fn from(err: &RegistryError) -> Self {
        match err {
            RegistryError::NicknameTaken(_) => ServerMessage::NicknameTaken,
            RegistryError::CapacityExceeded(_) | RegistryError::AllocationFailure(_) => {
                ServerMessage::ServerFull
            }
            // Internal inconsistencies; re-prompting is the safe answer
            _ => ServerMessage::Prompt,
        }
    }
}
