//! Client registry
//!
//! The authoritative set of connected clients keyed by identity, with a
//! second index by nickname. Both maps are updated together on every
//! mutation so a nickname is held by at most one client, and is released
//! the moment that client is removed.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::client::Client;
use crate::error::RegistryError;
use crate::session::SessionState;
use crate::types::ClientId;

/// Default upper bound on simultaneously connected clients
pub const DEFAULT_MAX_CLIENTS: usize = 1024;

/// Registry of connected clients
#[derive(Debug)]
pub struct ClientRegistry {
    /// All connected clients: ClientId -> Client
    clients: HashMap<ClientId, Client>,
    /// Registered nicknames: nickname -> ClientId
    nicknames: HashMap<String, ClientId>,
    /// Registration counter, gives registered clients a stable order
    next_joined: u64,
    max_clients: usize,
}

impl ClientRegistry {
    /// Create an empty registry with the default client limit
    pub fn new() -> Self {
        Self::with_max_clients(DEFAULT_MAX_CLIENTS)
    }

    /// Create an empty registry holding at most `max_clients` clients
    pub fn with_max_clients(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            nicknames: HashMap::new(),
            next_joined: 0,
            max_clients,
        }
    }

    /// Add a new unregistered client
    ///
    /// Fails when the identity is already present or when there is no room
    /// for another client.
    pub fn add(
        &mut self,
        id: ClientId,
        peer_addr: SocketAddr,
        sender: mpsc::Sender<Bytes>,
    ) -> Result<&Client, RegistryError> {
        if self.clients.contains_key(&id) {
            return Err(RegistryError::DuplicateIdentity(id));
        }
        if self.clients.len() >= self.max_clients {
            return Err(RegistryError::CapacityExceeded(self.max_clients));
        }
        self.clients.try_reserve(1)?;

        let client = self
            .clients
            .entry(id)
            .or_insert_with(|| Client::new(id, peer_addr, sender));
        Ok(&*client)
    }

    /// Look up a connected client, registered or not
    pub fn find_by_identity(&self, id: &ClientId) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Look up the client holding `nickname` (exact, case-sensitive)
    pub fn find_by_nickname(&self, nickname: &str) -> Option<&Client> {
        self.nicknames
            .get(nickname)
            .and_then(|id| self.clients.get(id))
    }

    /// Claim `nickname` for the client
    ///
    /// Exact, case-sensitive match. On conflict the client is left
    /// unregistered.
    pub fn register(&mut self, id: &ClientId, nickname: &str) -> Result<&Client, RegistryError> {
        let Some(client) = self.clients.get(id) else {
            return Err(RegistryError::UnknownClient(*id));
        };
        if client.state != SessionState::Unregistered {
            return Err(RegistryError::AlreadyRegistered(*id));
        }
        if self.find_by_nickname(nickname).is_some() {
            return Err(RegistryError::NicknameTaken(nickname.to_string()));
        }
        self.nicknames.try_reserve(1)?;

        let Some(client) = self.clients.get_mut(id) else {
            return Err(RegistryError::UnknownClient(*id));
        };
        self.next_joined += 1;
        client.set_nickname(nickname.to_string(), self.next_joined);
        self.nicknames.insert(nickname.to_string(), *id);
        Ok(&*client)
    }

    /// Mark a client as being torn down
    ///
    /// It stays in the registry, holding its nickname, until `remove`, but
    /// is no longer listed or broadcast to. Returns false for unknown ids.
    pub fn mark_closing(&mut self, id: &ClientId) -> bool {
        match self.clients.get_mut(id) {
            Some(client) => {
                client.state = SessionState::Closing;
                true
            }
            None => false,
        }
    }

    /// Detach a client and release its nickname
    ///
    /// Returns None if the client was already removed.
    pub fn remove(&mut self, id: &ClientId) -> Option<Client> {
        let client = self.clients.remove(id)?;
        if let Some(nickname) = &client.nickname {
            self.nicknames.remove(nickname);
        }
        Some(client)
    }

    /// Snapshot of registered clients in registration order
    pub fn registered(&self) -> Vec<&Client> {
        let mut clients: Vec<&Client> = self
            .clients
            .values()
            .filter(|c| c.is_registered())
            .collect();
        clients.sort_by_key(|c| c.joined);
        clients
    }

    /// Nicknames of registered clients other than `id`, in registration order
    pub fn other_nicknames(&self, id: &ClientId) -> Vec<String> {
        self.registered()
            .into_iter()
            .filter(|c| c.id != *id)
            .filter_map(|c| c.nickname.clone())
            .collect()
    }

    /// Number of connected clients, registered or not
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// True when no client is connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Number of nicknames currently held
    pub fn registered_count(&self) -> usize {
        self.nicknames.len()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
