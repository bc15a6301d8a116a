//! Framing of the TCP byte stream into messages.
//!
//! Two framings are supported:
//!
//! - [`Framing::Raw`] (default): whatever a single read returns is one
//!   message, capped at [`MAX_MESSAGE_SIZE`] bytes. There is no delimiter,
//!   so a message split across reads arrives as several messages and
//!   messages written back-to-back may arrive glued together. Kept for
//!   compatibility with existing clients.
//! - [`Framing::Line`]: newline-delimited messages (`\r\n` accepted).
//!   Outgoing messages are newline-terminated and embedded line breaks
//!   are flattened to spaces.

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::ProtocolError;

/// Largest message read in one go, matching the receive buffer of
/// existing clients.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// How messages are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// One read is one message
    #[default]
    Raw,
    /// One `\n`-terminated line is one message
    Line,
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => f.write_str("raw"),
            Self::Line => f.write_str("line"),
        }
    }
}

impl FromStr for Framing {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "line" => Ok(Self::Line),
            other => Err(ProtocolError::UnknownFraming(other.to_string())),
        }
    }
}

/// Codec implementing the configured [`Framing`] for both directions.
#[derive(Debug, Clone, Copy)]
pub struct WireCodec {
    framing: Framing,
    max_length: usize,
}

impl WireCodec {
    pub fn new(framing: Framing) -> Self {
        Self::with_max_length(framing, MAX_MESSAGE_SIZE)
    }

    pub fn with_max_length(framing: Framing, max_length: usize) -> Self {
        Self {
            framing,
            max_length: max_length.max(1),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    fn decode_line(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, ProtocolError> {
        match src.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                let mut line = src.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(pos.saturating_sub(1));
                }
                Ok(Some(line))
            }
            None if src.len() > self.max_length => Err(ProtocolError::FrameTooLarge {
                size: src.len(),
                max: self.max_length,
            }),
            None => Ok(None),
        }
    }
}

impl Decoder for WireCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.framing {
            Framing::Raw => {
                if src.is_empty() {
                    return Ok(None);
                }
                let len = src.len().min(self.max_length);
                Ok(Some(src.split_to(len)))
            }
            Framing::Line => self.decode_line(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            // An unterminated final line still counts as a message.
            None if !src.is_empty() => Ok(Some(src.split())),
            None => Ok(None),
        }
    }
}

impl Encoder<String> for WireCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match self.framing {
            Framing::Raw => {
                dst.reserve(item.len());
                dst.put_slice(item.as_bytes());
            }
            Framing::Line => {
                let flattened = item.replace(['\r', '\n'], " ");
                dst.reserve(flattened.len() + 1);
                dst.put_slice(flattened.as_bytes());
                dst.put_u8(b'\n');
            }
        }
        Ok(())
    }
}
