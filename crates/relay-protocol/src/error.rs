//! Protocol error types.

use thiserror::Error;

/// Errors raised while framing or classifying wire messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// `/w` or `/msg` without both a recipient and a message
    #[error("malformed private message: {0}")]
    MalformedPrivate(String),

    /// Payload was not valid UTF-8
    #[error("message is not valid UTF-8")]
    Decode(#[from] std::str::Utf8Error),

    /// A delimited frame grew past the configured limit without a delimiter
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Unknown framing name in configuration or on the command line
    #[error("unknown framing '{0}' (expected 'raw' or 'line')")]
    UnknownFraming(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
