//! Session identity, lifecycle state and metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use tracing::debug;

use crate::{DisplayName, DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identity of one accepted connection.
///
/// Assigned from a monotonically increasing counter by the listener, so it
/// is never reused during the lifetime of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle of a session.
///
/// ```text
/// Connecting ──▶ Active ──▶ Closing ──▶ Closed
///      │                       ▲
///      └───────────────────────┘  (handshake failed or shutdown)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Socket accepted, name not yet negotiated
    Connecting,
    /// Registered and routing messages
    Active,
    /// Read loop finished; socket close and registry removal pending
    Closing,
    /// Fully torn down
    Closed,
}

impl SessionState {
    /// Returns true if the state machine allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Active)
                | (Self::Connecting, Self::Closing)
                | (Self::Active, Self::Closing)
                | (Self::Closing, Self::Closed)
        )
    }

    /// Moves to `next`, rejecting transitions that skip a step.
    pub fn transition(self, next: SessionState) -> DomainResult<SessionState> {
        if self.can_transition_to(next) {
            debug!(from = %self, to = %next, "Session state transition");
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

// ============================================================================
// Session Metadata
// ============================================================================

/// Read-only view of a registered session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: DisplayName,
    pub addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn new(id: SessionId, name: DisplayName, addr: SocketAddr) -> Self {
        Self {
            id,
            name,
            addr,
            connected_at: Utc::now(),
        }
    }

    /// Seconds since the session registered.
    pub fn connected_secs(&self) -> i64 {
        (Utc::now() - self.connected_at).num_seconds().max(0)
    }
}
