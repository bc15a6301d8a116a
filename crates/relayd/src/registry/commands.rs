//! Registry actor commands, errors, and results.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `Registered` / `Renamed`: Successful outcomes of name-changing commands
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::net::SocketAddr;

use relay_core::{DisplayName, NameRequest, SessionId, SessionInfo};
use thiserror::Error;
use tokio::sync::oneshot;

use super::peer::{OutboundSender, Peer};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response. The actor handles
/// commands one at a time, so every command is atomic with respect to all
/// others; this is what makes check-and-insert race free.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Negotiate a unique name and insert the session.
    ///
    /// Notices about a replaced or suffixed name are queued on `outbound`
    /// before the session becomes visible to anyone else.
    ///
    /// # Errors
    /// - `RegistryError::RegistryFull` if at maximum capacity
    /// - `RegistryError::SessionAlreadyExists` if the id is registered
    /// - `RegistryError::ShuttingDown` once the registry has been drained
    Register {
        id: SessionId,
        addr: SocketAddr,
        request: NameRequest,
        outbound: OutboundSender,
        respond_to: oneshot::Sender<Result<Registered, RegistryError>>,
    },

    /// Change a registered session's name, suffixing it if taken.
    ///
    /// # Errors
    /// - `RegistryError::SessionNotFound` if the session is not registered
    Rename {
        id: SessionId,
        name: DisplayName,
        respond_to: oneshot::Sender<Result<Renamed, RegistryError>>,
    },

    /// Remove a session, returning its metadata if it was present.
    Remove {
        id: SessionId,
        respond_to: oneshot::Sender<Option<SessionInfo>>,
    },

    /// Exact, case-sensitive lookup by display name.
    Lookup {
        name: String,
        respond_to: oneshot::Sender<Option<Peer>>,
    },

    /// Copy of every registered session except `exclude`, in registration order.
    Snapshot {
        exclude: Option<SessionId>,
        respond_to: oneshot::Sender<Vec<Peer>>,
    },

    /// Record a chat line in history and snapshot the recipients in one step.
    Broadcast {
        exclude: Option<SessionId>,
        history_line: String,
        respond_to: oneshot::Sender<Vec<Peer>>,
    },

    /// Display names in registration order.
    ListNames {
        respond_to: oneshot::Sender<Vec<DisplayName>>,
    },

    /// The last `last` history lines, oldest first.
    History {
        last: usize,
        respond_to: oneshot::Sender<Vec<String>>,
    },

    /// Remove every session at once and refuse further registrations.
    Drain {
        respond_to: oneshot::Sender<Vec<Peer>>,
    },
}

// ============================================================================
// Results
// ============================================================================

/// Successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registered {
    /// The unique name the session was registered under
    pub name: DisplayName,
}

/// Successful rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub old: DisplayName,
    pub new: DisplayName,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry has reached its maximum session capacity.
    #[error("registry is full (max: {max} sessions)")]
    RegistryFull { max: usize },

    /// The requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// A session with this id already exists.
    #[error("session already exists: {0}")]
    SessionAlreadyExists(SessionId),

    /// The registry was drained by a shutdown.
    #[error("server is shutting down")]
    ShuttingDown,

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}
