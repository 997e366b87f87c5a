//! Per-connection session state machine
//!
//! `Unregistered → Registered → Closing`. Each complete line is turned into
//! a [`SessionAction`] based on the current state; the ChatServer applies it.

/// Session state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Connected, no nickname yet
    #[default]
    Unregistered,
    /// Holds a unique nickname, may chat
    Registered,
    /// Being torn down (terminal)
    Closing,
}

/// What a received line asks the server to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction<'a> {
    /// Empty line, or the session is closing
    Ignore,
    /// Claim this nickname
    Register(&'a str),
    /// Broadcast this chat text
    Chat(&'a str),
}

impl SessionState {
    /// Decide what a complete, trimmed line means in this state
    pub fn on_line(self, line: &str) -> SessionAction<'_> {
        if line.is_empty() {
            return SessionAction::Ignore;
        }
        match self {
            SessionState::Unregistered => SessionAction::Register(line),
            SessionState::Registered => SessionAction::Chat(line),
            SessionState::Closing => SessionAction::Ignore,
        }
    }

    /// True only while the session holds a nickname and may chat
    pub fn is_registered(self) -> bool {
        self == SessionState::Registered
    }
}
