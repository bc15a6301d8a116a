//! Relay Core - Shared types for the chat relay
//!
//! This crate provides the core domain types shared between
//! the daemon (relayd) and the terminal client (relay).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod history;
pub mod name;
pub mod session;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use history::{ChatHistory, DEFAULT_HISTORY_LIMIT};
pub use name::{DisplayName, NameRequest, RESERVED_NAMES};
pub use session::{SessionId, SessionInfo, SessionState};
