//! ChatServer Actor implementation
//!
//! The central actor that owns the client registry. Connection handlers
//! talk to it over an mpsc channel, so every registry change and every
//! broadcast happens on this one task, in the order commands arrive.

use std::collections::VecDeque;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broadcast::broadcast;
use crate::error::RegistryError;
use crate::message::ServerMessage;
use crate::registry::ClientRegistry;
use crate::session::SessionAction;
use crate::types::ClientId;

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New client connected
    Connect {
        client_id: ClientId,
        peer_addr: SocketAddr,
        sender: mpsc::Sender<Bytes>,
    },
    /// A complete, trimmed line arrived from the client
    Line {
        client_id: ClientId,
        line: String,
    },
    /// Client disconnected (peer closed or I/O error)
    Disconnect {
        client_id: ClientId,
    },
}

/// The main ChatServer actor
pub struct ChatServer {
    /// All connected clients
    registry: ClientRegistry,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            registry: ClientRegistry::new(),
            receiver,
        }
    }

    /// Create a ChatServer that accepts at most `max_clients` connections
    pub fn with_max_clients(receiver: mpsc::Receiver<ServerCommand>, max_clients: usize) -> Self {
        Self {
            registry: ClientRegistry::with_max_clients(max_clients),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                client_id,
                peer_addr,
                sender,
            } => {
                self.handle_connect(client_id, peer_addr, sender);
            }
            ServerCommand::Line { client_id, line } => {
                self.handle_line(client_id, &line);
            }
            ServerCommand::Disconnect { client_id } => {
                self.disconnect(client_id);
            }
        }
    }

    /// Handle new client connection
    fn handle_connect(
        &mut self,
        client_id: ClientId,
        peer_addr: SocketAddr,
        sender: mpsc::Sender<Bytes>,
    ) {
        let added = self
            .registry
            .add(client_id, peer_addr, sender.clone())
            .map(|_| ());
        match added {
            Ok(()) => {
                info!("Client {} connected from {}", client_id, peer_addr);
                self.send_to(client_id, ServerMessage::Prompt);
            }
            Err(e) => {
                warn!("Refusing client {} from {}: {}", client_id, peer_addr, e);
                // Dropping the sender afterwards closes the connection
                let _ = sender.try_send(ServerMessage::from(&e).to_wire());
            }
        }
        debug!(
            "Total clients: {}, registered: {}",
            self.registry.len(),
            self.registry.registered_count()
        );
    }

    /// Route a line according to the client's session state
    fn handle_line(&mut self, client_id: ClientId, line: &str) {
        let Some(client) = self.registry.find_by_identity(&client_id) else {
            debug!("Line from removed client {} ignored", client_id);
            return;
        };

        match client.state.on_line(line) {
            SessionAction::Ignore => {}
            SessionAction::Register(nickname) => self.handle_register(client_id, nickname),
            SessionAction::Chat(content) => self.handle_chat(client_id, content),
        }
    }

    /// Handle a nickname attempt from an unregistered client
    fn handle_register(&mut self, client_id: ClientId, nickname: &str) {
        let registered = self.registry.register(&client_id, nickname).map(|_| ());
        match registered {
            Ok(()) => {
                info!("Client {} registered as '{}'", client_id, nickname);
                let others = self.registry.other_nicknames(&client_id);
                self.send_to(client_id, ServerMessage::Welcome { others });
            }
            Err(e) => {
                let reply = ServerMessage::from(&e);
                match e {
                    RegistryError::NicknameTaken(_) => {
                        info!("Client {} asked for taken nickname '{}'", client_id, nickname);
                        self.send_to(client_id, reply);
                    }
                    RegistryError::AllocationFailure(_) | RegistryError::CapacityExceeded(_) => {
                        warn!("Dropping client {}: {}", client_id, e);
                        self.send_to(client_id, reply);
                        self.disconnect(client_id);
                    }
                    _ => {
                        warn!("Registration of client {} failed: {}", client_id, e);
                        self.send_to(client_id, reply);
                    }
                }
            }
        }
    }

    /// Handle chat message from a registered client
    fn handle_chat(&mut self, client_id: ClientId, content: &str) {
        let Some(from) = self
            .registry
            .find_by_identity(&client_id)
            .and_then(|c| c.nickname.clone())
        else {
            return;
        };

        info!("{}: {}", from, content);

        let msg = ServerMessage::Chat {
            from,
            content: content.to_string(),
        };
        self.broadcast_and_prune(Some(client_id), &msg);
    }

    /// Broadcast, then remove every recipient that could not take the message
    fn broadcast_and_prune(&mut self, excluded: Option<ClientId>, message: &ServerMessage) {
        let report = broadcast(&self.registry, excluded, message);
        for (client_id, e) in &report.failed {
            warn!("Dropping client {} after failed delivery: {}", client_id, e);
            self.registry.mark_closing(client_id);
        }
        for (client_id, _) in report.failed {
            self.disconnect(client_id);
        }
    }

    /// Queue a message for one client, dropping the client if it cannot take it
    fn send_to(&mut self, client_id: ClientId, message: ServerMessage) {
        let Some(client) = self.registry.find_by_identity(&client_id) else {
            return;
        };
        if let Err(e) = client.send(message.to_wire()) {
            warn!("Dropping client {} after failed send: {}", client_id, e);
            self.disconnect(client_id);
        }
    }

    /// Remove a client and tell everyone left
    ///
    /// Idempotent: unknown or already removed clients are ignored. Clients
    /// that fail to receive a departure notice are removed in turn.
    fn disconnect(&mut self, client_id: ClientId) {
        let mut pending = VecDeque::from([client_id]);

        while let Some(client_id) = pending.pop_front() {
            let Some(client) = self.registry.remove(&client_id) else {
                debug!("Client {} already removed", client_id);
                continue;
            };

            info!(
                "Client {} ('{}', {}) disconnected",
                client_id,
                client.display_name(),
                client.peer_addr
            );

            let notice = ServerMessage::Left {
                nickname: client.display_name().to_string(),
            };
            // Closes the client's outbound queue
            drop(client);

            let report = broadcast(&self.registry, None, &notice);
            for (failed_id, e) in report.failed {
                warn!("Dropping client {} after failed delivery: {}", failed_id, e);
                self.registry.mark_closing(&failed_id);
                pending.push_back(failed_id);
            }
        }

        debug!(
            "Total clients: {}, registered: {}",
            self.registry.len(),
            self.registry.registered_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn new_server() -> ChatServer {
        let (_tx, rx) = mpsc::channel(1);
        ChatServer::new(rx)
    }

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    fn connect(server: &mut ChatServer, capacity: usize) -> (ClientId, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let client_id = ClientId::new();
        server.handle_command(ServerCommand::Connect {
            client_id,
            peer_addr: addr(),
            sender: tx,
        });
        (client_id, rx)
    }

    fn line(server: &mut ChatServer, client_id: ClientId, text: &str) {
        server.handle_command(ServerCommand::Line {
            client_id,
            line: text.to_string(),
        });
    }

    fn disconnect(server: &mut ChatServer, client_id: ClientId) {
        server.handle_command(ServerCommand::Disconnect { client_id });
    }

    /// Everything currently queued for a client, concatenated
    fn drain(rx: &mut mpsc::Receiver<Bytes>) -> String {
        let mut out = String::new();
        while let Ok(bytes) = rx.try_recv() {
            out.push_str(std::str::from_utf8(&bytes).unwrap());
        }
        out
    }

    fn registered(
        server: &mut ChatServer,
        nickname: &str,
        capacity: usize,
    ) -> (ClientId, mpsc::Receiver<Bytes>) {
        let (id, mut rx) = connect(server, capacity);
        line(server, id, nickname);
        drain(&mut rx);
        (id, rx)
    }

    #[test]
    fn test_connect_sends_prompt() {
        let mut server = new_server();
        let (_id, mut rx) = connect(&mut server, 8);

        assert_eq!(drain(&mut rx), "Welcome! Enter your nickname:\r\n> ");
    }

    #[test]
    fn test_first_user_is_alone() {
        let mut server = new_server();
        let (id, mut rx) = connect(&mut server, 8);
        drain(&mut rx);

        line(&mut server, id, "alice");

        assert_eq!(drain(&mut rx), "Welcome! You are the only user here.\r\n");
    }

    #[test]
    fn test_duplicate_nickname_is_rejected_then_retry_succeeds() {
        let mut server = new_server();
        let (_alice, _rx_a) = registered(&mut server, "alice", 8);
        let (b, mut rx_b) = connect(&mut server, 8);
        drain(&mut rx_b);

        line(&mut server, b, "alice");
        assert_eq!(
            drain(&mut rx_b),
            "Error: nickname already taken, choose another:\r\n> "
        );
        assert!(!server.registry.find_by_identity(&b).unwrap().is_registered());

        line(&mut server, b, "bob");
        assert_eq!(drain(&mut rx_b), "Welcome! 1 other user online: alice\r\n");
    }

    #[test]
    fn test_pending_client_is_not_listed_or_broadcast_to() {
        let mut server = new_server();
        let (alice, _rx_a) = registered(&mut server, "alice", 8);
        let (_pending, mut rx_p) = connect(&mut server, 8);
        drain(&mut rx_p);

        line(&mut server, alice, "hello");
        assert_eq!(drain(&mut rx_p), "");

        let (bob, mut rx_b) = connect(&mut server, 8);
        drain(&mut rx_b);
        line(&mut server, bob, "bob");
        assert_eq!(drain(&mut rx_b), "Welcome! 1 other user online: alice\r\n");
    }

    #[test]
    fn test_chat_reaches_others_but_not_sender() {
        let mut server = new_server();
        let (alice, mut rx_a) = registered(&mut server, "alice", 8);
        let (_bob, mut rx_b) = registered(&mut server, "bob", 8);
        let (_carol, mut rx_c) = registered(&mut server, "carol", 8);

        line(&mut server, alice, "hi");

        assert_eq!(drain(&mut rx_b), "alice: hi\r\n");
        assert_eq!(drain(&mut rx_c), "alice: hi\r\n");
        assert_eq!(drain(&mut rx_a), "");
    }

    #[test]
    fn test_lines_are_delivered_in_order() {
        let mut server = new_server();
        let (alice, _rx_a) = registered(&mut server, "alice", 8);
        let (_bob, mut rx_b) = registered(&mut server, "bob", 8);

        line(&mut server, alice, "one");
        line(&mut server, alice, "two");
        line(&mut server, alice, "three");

        assert_eq!(drain(&mut rx_b), "alice: one\r\nalice: two\r\nalice: three\r\n");
    }

    #[test]
    fn test_empty_line_does_nothing() {
        let mut server = new_server();
        let (alice, mut rx_a) = registered(&mut server, "alice", 8);
        let (_bob, mut rx_b) = registered(&mut server, "bob", 8);

        line(&mut server, alice, "");

        assert_eq!(drain(&mut rx_a), "");
        assert_eq!(drain(&mut rx_b), "");
    }

    #[test]
    fn test_empty_line_while_unregistered_keeps_waiting() {
        let mut server = new_server();
        let (id, mut rx) = connect(&mut server, 8);
        drain(&mut rx);

        line(&mut server, id, "");
        assert_eq!(drain(&mut rx), "");

        line(&mut server, id, "alice");
        assert_eq!(drain(&mut rx), "Welcome! You are the only user here.\r\n");
    }

    #[test]
    fn test_disconnect_notifies_and_releases_nickname() {
        let mut server = new_server();
        let (alice, _rx_a) = registered(&mut server, "alice", 8);
        let (_bob, mut rx_b) = registered(&mut server, "bob", 8);

        disconnect(&mut server, alice);
        assert_eq!(drain(&mut rx_b), "User 'alice' left the chat.\r\n");

        let (again, mut rx) = connect(&mut server, 8);
        drain(&mut rx);
        line(&mut server, again, "alice");
        assert_eq!(drain(&mut rx), "Welcome! 1 other user online: bob\r\n");
    }

    #[test]
    fn test_disconnect_twice_notifies_once() {
        let mut server = new_server();
        let (alice, _rx_a) = registered(&mut server, "alice", 8);
        let (_bob, mut rx_b) = registered(&mut server, "bob", 8);

        disconnect(&mut server, alice);
        disconnect(&mut server, alice);

        assert_eq!(drain(&mut rx_b), "User 'alice' left the chat.\r\n");
    }

    #[test]
    fn test_unregistered_departure_uses_placeholder() {
        let mut server = new_server();
        let (_bob, mut rx_b) = registered(&mut server, "bob", 8);
        let (pending, _rx_p) = connect(&mut server, 8);

        disconnect(&mut server, pending);

        assert_eq!(drain(&mut rx_b), "User 'unknown' left the chat.\r\n");
    }

    #[test]
    fn test_removed_client_queue_is_closed() {
        let mut server = new_server();
        let (alice, mut rx_a) = registered(&mut server, "alice", 8);

        disconnect(&mut server, alice);

        assert_eq!(rx_a.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_line_after_disconnect_is_ignored() {
        let mut server = new_server();
        let (alice, _rx_a) = registered(&mut server, "alice", 8);
        let (_bob, mut rx_b) = registered(&mut server, "bob", 8);

        disconnect(&mut server, alice);
        drain(&mut rx_b);
        line(&mut server, alice, "ghost");

        assert_eq!(drain(&mut rx_b), "");
    }

    #[test]
    fn test_slow_client_is_dropped_others_still_served() {
        let mut server = new_server();
        let (alice, _rx_a) = registered(&mut server, "alice", 8);
        let (_slow, mut rx_slow) = registered(&mut server, "slow", 1);
        let (_bob, mut rx_b) = registered(&mut server, "bob", 8);

        line(&mut server, alice, "first");
        line(&mut server, alice, "second");

        assert_eq!(
            drain(&mut rx_b),
            "alice: first\r\nalice: second\r\nUser 'slow' left the chat.\r\n"
        );
        assert_eq!(drain(&mut rx_slow), "alice: first\r\n");
        assert!(server.registry.find_by_nickname("slow").is_none());
    }

    #[test]
    fn test_closed_client_is_dropped_on_broadcast() {
        let mut server = new_server();
        let (alice, _rx_a) = registered(&mut server, "alice", 8);
        let (_gone, rx_gone) = registered(&mut server, "gone", 8);
        let (_bob, mut rx_b) = registered(&mut server, "bob", 8);
        drop(rx_gone);

        line(&mut server, alice, "hi");

        assert_eq!(
            drain(&mut rx_b),
            "alice: hi\r\nUser 'gone' left the chat.\r\n"
        );
        assert_eq!(server.registry.registered_count(), 2);
    }

    #[test]
    fn test_failed_recipients_skip_later_notices() {
        let mut server = new_server();
        let (alice, _rx_a) = registered(&mut server, "alice", 8);
        let (_gone1, rx_g1) = registered(&mut server, "gone1", 8);
        let (_gone2, rx_g2) = registered(&mut server, "gone2", 8);
        let (_bob, mut rx_b) = registered(&mut server, "bob", 8);
        drop(rx_g1);
        drop(rx_g2);

        line(&mut server, alice, "hi");

        // Each failed recipient leaves exactly once, in delivery order
        assert_eq!(
            drain(&mut rx_b),
            "alice: hi\r\nUser 'gone1' left the chat.\r\nUser 'gone2' left the chat.\r\n"
        );
        assert_eq!(server.registry.len(), 2);
    }

    #[test]
    fn test_closing_client_lines_are_ignored() {
        let mut server = new_server();
        let (alice, mut rx_a) = registered(&mut server, "alice", 8);
        let (bob, mut rx_b) = registered(&mut server, "bob", 8);

        server.registry.mark_closing(&bob);
        line(&mut server, bob, "still here?");
        line(&mut server, alice, "hello");

        assert_eq!(drain(&mut rx_a), "");
        assert_eq!(drain(&mut rx_b), "");

        disconnect(&mut server, bob);
        assert_eq!(drain(&mut rx_a), "User 'bob' left the chat.\r\n");
    }

    #[test]
    fn test_capacity_refuses_extra_client() {
        let (_tx, rx) = mpsc::channel(1);
        let mut server = ChatServer::with_max_clients(rx, 1);
        let (_first, _rx_1) = connect(&mut server, 8);
        let (second, mut rx_2) = connect(&mut server, 8);

        assert_eq!(drain(&mut rx_2), "Error: server is full, try again later.\r\n");
        assert_eq!(rx_2.try_recv(), Err(TryRecvError::Disconnected));
        assert!(server.registry.find_by_identity(&second).is_none());
    }

    #[tokio::test]
    async fn test_run_processes_commands_until_senders_drop() {
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(ChatServer::new(rx).run());

        let (msg_tx, mut msg_rx) = mpsc::channel(8);
        let client_id = ClientId::new();
        tx.send(ServerCommand::Connect {
            client_id,
            peer_addr: addr(),
            sender: msg_tx,
        })
        .await
        .unwrap();

        let prompt = msg_rx.recv().await.unwrap();
        assert_eq!(&prompt[..], b"Welcome! Enter your nickname:\r\n> ");

        drop(tx);
        handle.await.unwrap();
    }
}
