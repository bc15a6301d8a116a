//! Outbound side of a registered session.
//!
//! Every session owns a bounded queue drained by its writer task. Routing
//! never touches sockets directly: it pushes rendered messages onto the
//! queues of a registry snapshot, so a slow or dead recipient can only lose
//! its own messages.

use std::time::Duration;

use relay_core::{DisplayName, SessionId};
use relay_protocol::ServerMessage;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Capacity of each session's outbound queue.
pub const OUTBOUND_BUFFER: usize = 256;

/// How long the shutdown sentinel may wait for queue space.
const SENTINEL_TIMEOUT: Duration = Duration::from_millis(200);

/// Item on a session's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Rendered wire text
    Message(String),
    /// Write the shutdown sentinel, then close the socket
    Shutdown,
    /// Flush and close the socket
    Close,
}

pub type OutboundSender = mpsc::Sender<Outbound>;
pub type OutboundReceiver = mpsc::Receiver<Outbound>;

/// Creates a session's outbound queue.
pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(OUTBOUND_BUFFER)
}

/// Copy of a registered session taken from a registry snapshot.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: SessionId,
    pub name: DisplayName,
    pub outbound: OutboundSender,
}

impl Peer {
    /// Queues a message without waiting.
    ///
    /// Failures are logged and reported as `false`; they never remove the
    /// peer from the registry.
    pub fn deliver(&self, msg: &ServerMessage) -> bool {
        enqueue(&self.outbound, msg, &self.name)
    }

    /// Queues the shutdown sentinel, waiting briefly for space.
    pub async fn send_shutdown(&self) -> bool {
        match timeout(SENTINEL_TIMEOUT, self.outbound.send(Outbound::Shutdown)).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                debug!(session = %self.id, name = %self.name, "Writer already gone, sentinel not sent");
                false
            }
            Err(_) => {
                warn!(session = %self.id, name = %self.name, "Outbound queue full, sentinel not sent");
                false
            }
        }
    }
}

/// Queues a message on `outbound`, logging per-recipient failures.
pub fn enqueue(outbound: &OutboundSender, msg: &ServerMessage, name: &DisplayName) -> bool {
    match outbound.try_send(Outbound::Message(msg.to_string())) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(recipient = %name, "Outbound queue full, dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(recipient = %name, "Recipient writer closed, dropping message");
            false
        }
    }
}

/// Delivers `msg` to every peer, returning how many accepted it.
pub fn deliver_all(peers: &[Peer], msg: &ServerMessage) -> usize {
    peers.iter().filter(|peer| peer.deliver(msg)).count()
}
