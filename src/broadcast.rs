//! Broadcast engine
//!
//! Renders a message once and queues the same wire bytes to every
//! registered client except the optional excluded one. The registry is
//! only borrowed while delivering; recipients whose queue rejects the
//! message are reported back so the caller can remove them afterwards.

use tracing::debug;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::registry::ClientRegistry;
use crate::types::ClientId;

/// Outcome of one broadcast
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Number of clients the message was queued for
    pub delivered: usize,
    /// Clients that could not accept the message
    pub failed: Vec<(ClientId, SendError)>,
}

/// Deliver `message` to every registered client except `excluded`
///
/// Pass `None` to include everyone (departure notices are sent after the
/// leaving client has already been removed).
pub fn broadcast(
    registry: &ClientRegistry,
    excluded: Option<ClientId>,
    message: &ServerMessage,
) -> BroadcastReport {
    let wire = message.to_wire();
    let mut report = BroadcastReport::default();

    for client in registry.registered() {
        if Some(client.id) == excluded {
            continue;
        }
        match client.send(wire.clone()) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                debug!("Broadcast to {} failed: {}", client.id, e);
                report.failed.push((client.id, e));
            }
        }
    }

    report
}
