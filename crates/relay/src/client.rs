//! Server connection for the chat client.
//!
//! This module provides the `ChatClient` which handles:
//! - Connecting to the relay and sending the requested display name
//! - Writing user input to the server
//! - Classifying server messages and forwarding them as [`ClientEvent`]s
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

use futures::{SinkExt, StreamExt};
use relay_protocol::{Framing, ServerMessage, WireCodec};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Where to connect and who to be.
///
/// # Example
///
/// ```rust
/// use relay_client::ClientConfig;
///
/// let config = ClientConfig {
///     name: "Alice".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.addr(), "127.0.0.1:50000");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Requested display name; the server may assign another
    pub name: String,
    /// Must match the server's framing
    pub framing: Framing,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50000,
            name: String::new(),
            framing: Framing::Raw,
        }
    }
}

impl ClientConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Something the server told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A classified server message
    Message(ServerMessage),
    /// The server assigned us a different display name
    Renamed(String),
    /// The server is shutting down; the connection is over
    Shutdown,
    /// The connection closed without a shutdown notice
    Disconnected,
}

/// Turns one received frame into events.
///
/// With raw framing the shutdown sentinel may arrive glued to the end of a
/// notice, so the notice is still delivered. A chat line that merely
/// mentions the sentinel stays a chat line. If the sentinel lands glued to
/// a chat line, the shutdown surfaces as [`ClientEvent::Disconnected`] once
/// the server closes the socket.
pub fn classify(frame: &str, framing: Framing) -> Vec<ClientEvent> {
    let Some(before) = ServerMessage::split_shutdown(frame, framing) else {
        return message_events(frame);
    };

    let mut events = message_events(before);
    events.push(ClientEvent::Shutdown);
    events
}

fn message_events(text: &str) -> Vec<ClientEvent> {
    let text = text.trim_end_matches(['\r', '\n']);
    if text.trim().is_empty() {
        return Vec::new();
    }

    let msg = ServerMessage::parse(text);
    let mut events = Vec::with_capacity(2);
    if let Some(name) = msg.assigned_name() {
        events.push(ClientEvent::Renamed(name.to_string()));
    }
    events.push(ClientEvent::Message(msg));
    events
}

// ============================================================================
// Chat Client
// ============================================================================

/// An open connection to the relay.
///
/// Incoming messages are read on a background task and forwarded to the
/// event channel given to [`ChatClient::connect`].
pub struct ChatClient {
    writer: FramedWrite<OwnedWriteHalf, WireCodec>,
    reader: JoinHandle<()>,
    cancel_token: CancellationToken,
    addr: String,
}

impl ChatClient {
    /// Connects and sends the requested display name.
    ///
    /// # Errors
    ///
    /// - `ClientError::EmptyName` if the configured name is blank
    /// - `ClientError::Connect` if the server cannot be reached
    /// - `ClientError::Send` if the name cannot be written
    pub async fn connect(
        config: &ClientConfig,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Result<Self> {
        let name = config.name.trim();
        if name.is_empty() {
            return Err(ClientError::EmptyName);
        }

        let addr = config.addr();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| ClientError::Connect {
                addr: addr.clone(),
                error: e.to_string(),
            })?;
        info!(addr = %addr, "Connected to server");

        let codec = WireCodec::new(config.framing);
        let (read_half, write_half) = stream.into_split();
        let mut writer = FramedWrite::new(write_half, codec);
        writer.send(name.to_string()).await?;

        let cancel_token = CancellationToken::new();
        let reader = tokio::spawn(read_loop(
            FramedRead::new(read_half, codec),
            events,
            cancel_token.clone(),
        ));

        Ok(Self {
            writer,
            reader,
            cancel_token,
            addr,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends one line of user input as typed.
    ///
    /// # Errors
    ///
    /// - `ClientError::Disconnected` if the server side has gone away
    /// - `ClientError::Send` if the write fails
    pub async fn send(&mut self, text: &str) -> Result<()> {
        if self.reader.is_finished() {
            return Err(ClientError::Disconnected);
        }
        self.writer.send(text.to_string()).await?;
        Ok(())
    }

    /// Closes the connection and waits for the reader task.
    pub async fn disconnect(mut self) {
        self.cancel_token.cancel();
        if let Err(e) = self.writer.close().await {
            debug!(error = %e, "Error closing connection");
        }
        if let Err(e) = self.reader.await {
            debug!(error = %e, "Reader task failed");
        }
        info!(addr = %self.addr, "Disconnected");
    }
}

async fn read_loop(
    mut reader: FramedRead<OwnedReadHalf, WireCodec>,
    events: mpsc::UnboundedSender<ClientEvent>,
    cancel_token: CancellationToken,
) {
    let framing = reader.decoder().framing();
    loop {
        let frame = tokio::select! {
            _ = cancel_token.cancelled() => return,
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(bytes)) => {
                let chunk = String::from_utf8_lossy(&bytes);
                for event in classify(&chunk, framing) {
                    let last = event == ClientEvent::Shutdown;
                    // Receiver gone means the user is leaving anyway
                    if events.send(event).is_err() || last {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "Failed to read from server");
                let _ = events.send(ClientEvent::Disconnected);
                return;
            }
            None => {
                debug!("Server closed the connection");
                let _ = events.send(ClientEvent::Disconnected);
                return;
            }
        }
    }
}
