//! Error types for the chat client.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

use relay_protocol::ProtocolError;
use thiserror::Error;

/// Client errors.
///
/// Connection errors carry the address so the message tells the user
/// where the server was expected.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server could not be reached.
    #[error("Failed to connect to {addr}: {error}. Is relayd running?")]
    Connect { addr: String, error: String },

    /// A message could not be written to the server.
    #[error("Failed to send message: {0}")]
    Send(#[from] ProtocolError),

    /// The connection is already closed.
    #[error("Not connected to the server")]
    Disconnected,

    /// The display name was empty.
    #[error("Display name must not be empty")]
    EmptyName,
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
