//! Relay Client - Terminal client library for chatrelay
//!
//! - `client` - connection, input forwarding and message classification
//! - `view` - terminal rendering with local timestamps
//! - `error` - client error types

pub mod client;
pub mod error;
pub mod view;

pub use client::{classify, ChatClient, ClientConfig, ClientEvent};
pub use error::{ClientError, Result};
pub use view::{local_echo, render};
