//! Domain-specific error types following panic-free policy.

use crate::SessionState;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A session lifecycle transition that the state machine does not allow
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// Display name rejected outright (rename requests only)
    #[error("Invalid display name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
