//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending
//! commands to the registry actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`, or to an
//!   empty result for read-only queries

use std::net::SocketAddr;

use relay_core::{DisplayName, NameRequest, SessionId, SessionInfo};
use tokio::sync::{mpsc, oneshot};

use super::commands::{Registered, RegistryCommand, RegistryError, Renamed};
use super::peer::{OutboundSender, Peer};

/// Handle for interacting with the registry actor.
///
/// # Usage
///
/// ```ignore
/// let registered = handle.register(id, addr, request, outbound).await?;
/// let peers = handle.snapshot(Some(id)).await;
/// for peer in &peers {
///     peer.deliver(&msg);
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Sends a command and awaits its response.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Negotiate a unique name and register the session.
    ///
    /// # Errors
    ///
    /// - `RegistryError::RegistryFull` if the registry is at maximum capacity
    /// - `RegistryError::ShuttingDown` if the registry has been drained
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn register(
        &self,
        id: SessionId,
        addr: SocketAddr,
        request: NameRequest,
        outbound: OutboundSender,
    ) -> Result<Registered, RegistryError> {
        self.request(|respond_to| RegistryCommand::Register {
            id,
            addr,
            request,
            outbound,
            respond_to,
        })
        .await?
    }

    /// Rename a registered session.
    ///
    /// # Errors
    ///
    /// - `RegistryError::SessionNotFound` if the session is not registered
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn rename(&self, id: SessionId, name: DisplayName) -> Result<Renamed, RegistryError> {
        self.request(|respond_to| RegistryCommand::Rename {
            id,
            name,
            respond_to,
        })
        .await?
    }

    /// Remove a session. Returns `None` if it was not registered.
    pub async fn remove(&self, id: SessionId) -> Option<SessionInfo> {
        self.request(|respond_to| RegistryCommand::Remove { id, respond_to })
            .await
            .ok()
            .flatten()
    }

    /// Exact-match lookup by display name.
    pub async fn lookup(&self, name: &str) -> Option<Peer> {
        self.request(|respond_to| RegistryCommand::Lookup {
            name: name.to_string(),
            respond_to,
        })
        .await
        .ok()
        .flatten()
    }

    /// Snapshot of all sessions except `exclude`.
    pub async fn snapshot(&self, exclude: Option<SessionId>) -> Vec<Peer> {
        self.request(|respond_to| RegistryCommand::Snapshot {
            exclude,
            respond_to,
        })
        .await
        .unwrap_or_default()
    }

    /// Record `history_line` and snapshot all sessions except `exclude`.
    pub async fn broadcast(&self, exclude: Option<SessionId>, history_line: String) -> Vec<Peer> {
        self.request(|respond_to| RegistryCommand::Broadcast {
            exclude,
            history_line,
            respond_to,
        })
        .await
        .unwrap_or_default()
    }

    /// Display names in registration order.
    pub async fn names(&self) -> Vec<DisplayName> {
        self.request(|respond_to| RegistryCommand::ListNames { respond_to })
            .await
            .unwrap_or_default()
    }

    /// The last `last` history lines.
    pub async fn history(&self, last: usize) -> Vec<String> {
        self.request(|respond_to| RegistryCommand::History { last, respond_to })
            .await
            .unwrap_or_default()
    }

    /// Remove every session and refuse new registrations.
    pub async fn drain(&self) -> Vec<Peer> {
        self.request(|respond_to| RegistryCommand::Drain { respond_to })
            .await
            .unwrap_or_default()
    }
}
