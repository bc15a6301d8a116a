//! Relay Protocol - Wire protocol for the chat relay
//!
//! This crate provides the text formats exchanged between clients and
//! the daemon:
//! - `command` - classification of client input into [`ClientCommand`]
//! - `message` - formatting and parsing of [`ServerMessage`] lines
//! - `codec` - framing of the byte stream into messages
//!
//! The wire is plain UTF-8 with no length prefix. By default one read is
//! one message (see [`Framing::Raw`]).

pub mod codec;
pub mod command;
pub mod error;
pub mod message;

pub use codec::{Framing, WireCodec, MAX_MESSAGE_SIZE};
pub use command::{parse_client_message, ClientCommand, PRIVATE_USAGE};
pub use error::ProtocolError;
pub use message::{ServerMessage, SHUTDOWN_SENTINEL};
