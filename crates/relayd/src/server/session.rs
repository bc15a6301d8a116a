//! Per-client session handling.
//!
//! Each accepted socket is split in two:
//! - a [`SessionHandler`] owns the read half: handshake, read loop and teardown
//! - a writer task owns the write half and drains the session's outbound queue
//!
//! Nothing but the writer task ever writes to the socket, so messages from
//! many routing tasks reach the client whole and in queue order.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use relay_core::{DisplayName, NameRequest, SessionId, SessionState};
use relay_protocol::{
    parse_client_message, ProtocolError, ServerMessage, WireCodec, PRIVATE_USAGE,
    SHUTDOWN_SENTINEL,
};
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::router::{Origin, Router};
use crate::registry::{enqueue, Outbound, OutboundReceiver, OutboundSender, RegistryError};

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long teardown waits on the writer task
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors that end a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("no data received within the idle timeout")]
    IdleTimeout,
}

/// Why a session ended.
#[derive(Debug)]
enum CloseReason {
    PeerClosed,
    Shutdown,
    Failed(SessionError),
}

/// Read side of one client session.
pub struct SessionHandler {
    id: SessionId,
    addr: SocketAddr,
    reader: Option<FramedRead<OwnedReadHalf, WireCodec>>,
    outbound: OutboundSender,
    router: Router,
    shutdown: CancellationToken,
    idle_timeout: Option<Duration>,
    state: SessionState,
}

impl SessionHandler {
    /// Creates a handler for a freshly accepted connection.
    pub fn new(
        id: SessionId,
        addr: SocketAddr,
        reader: FramedRead<OwnedReadHalf, WireCodec>,
        outbound: OutboundSender,
        router: Router,
        shutdown: CancellationToken,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            id,
            addr,
            reader: Some(reader),
            outbound,
            router,
            shutdown,
            idle_timeout,
            state: SessionState::Connecting,
        }
    }

    /// Runs the session to completion.
    ///
    /// `writer` is the task draining this session's outbound queue; it is
    /// joined during teardown.
    pub async fn run(mut self, writer: JoinHandle<()>) {
        debug!(session = %self.id, peer = %self.addr, "New client connected");

        let mut origin = match self.negotiate().await {
            Ok(origin) => origin,
            Err(reason) => {
                self.finish(None, reason, writer).await;
                return;
            }
        };

        self.advance(SessionState::Active);
        info!(session = %self.id, peer = %self.addr, name = %origin.name, "Client joined");
        self.router.announce_join(origin.id, &origin.name).await;

        let reason = self.process_messages(&mut origin).await;
        self.finish(Some(origin), reason, writer).await;
    }

    /// Reads the requested name and registers the session.
    async fn negotiate(&mut self) -> Result<Origin, CloseReason> {
        let shutdown = self.shutdown.clone();
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(CloseReason::Shutdown),
            frame = self.next_frame() => frame,
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(CloseReason::PeerClosed),
            Err(e) => return Err(CloseReason::Failed(e)),
        };

        let requested = std::str::from_utf8(&frame).ok();
        if requested.is_none() {
            debug!(session = %self.id, "Handshake name is not valid UTF-8");
        }
        let request = NameRequest::from_handshake(requested, self.addr.port());

        match self
            .router
            .registry()
            .register(self.id, self.addr, request, self.outbound.clone())
            .await
        {
            Ok(registered) => Ok(Origin::new(self.id, registered.name, self.outbound.clone())),
            Err(RegistryError::ShuttingDown) => Err(CloseReason::Shutdown),
            Err(RegistryError::RegistryFull { max }) => {
                warn!(session = %self.id, peer = %self.addr, max, "Registry full, rejecting client");
                enqueue(
                    &self.outbound,
                    &ServerMessage::server_full(max),
                    &DisplayName::fallback_for_port(self.addr.port()),
                );
                Err(CloseReason::Failed(RegistryError::RegistryFull { max }.into()))
            }
            Err(e) => Err(CloseReason::Failed(e.into())),
        }
    }

    /// Main read loop. Returns once the session should close.
    async fn process_messages(&mut self, origin: &mut Origin) -> CloseReason {
        let shutdown = self.shutdown.clone();
        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return CloseReason::Shutdown,
                frame = self.next_frame() => frame,
            };

            match frame {
                Ok(Some(frame)) => self.handle_frame(origin, &frame).await,
                Ok(None) => return CloseReason::PeerClosed,
                Err(e) => return CloseReason::Failed(e),
            }
        }
    }

    /// Reads the next frame, honouring the idle timeout.
    async fn next_frame(&mut self) -> Result<Option<BytesMut>, SessionError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let next = match self.idle_timeout {
            Some(limit) => timeout(limit, reader.next())
                .await
                .map_err(|_| SessionError::IdleTimeout)?,
            None => reader.next().await,
        };

        next.transpose().map_err(SessionError::from)
    }

    async fn handle_frame(&self, origin: &mut Origin, frame: &[u8]) {
        // Blank lines in line framing
        if frame.is_empty() {
            return;
        }

        let text = match std::str::from_utf8(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(session = %self.id, error = %e, "Failed to decode message");
                origin.reply(ServerMessage::decode_error());
                return;
            }
        };

        match parse_client_message(text) {
            Ok(command) => self.router.dispatch(origin, command).await,
            Err(e) => {
                debug!(session = %self.id, error = %e, "Rejected client message");
                origin.reply(ServerMessage::malformed_private(PRIVATE_USAGE));
            }
        }
    }

    /// Removes the session, announces the departure and closes the socket.
    async fn finish(mut self, origin: Option<Origin>, reason: CloseReason, writer: JoinHandle<()>) {
        self.advance(SessionState::Closing);

        match &reason {
            CloseReason::PeerClosed => debug!(session = %self.id, "Client closed the connection"),
            CloseReason::Shutdown => debug!(session = %self.id, "Session closed by shutdown"),
            CloseReason::Failed(e) => {
                warn!(session = %self.id, peer = %self.addr, error = %e, "Session failed")
            }
        }

        let shutting_down = matches!(reason, CloseReason::Shutdown);

        if let Some(origin) = &origin {
            // `None` means shutdown drained the registry first; stay quiet.
            if let Some(info) = self.router.registry().remove(origin.id).await {
                if !shutting_down {
                    self.router.announce_leave(&info.name).await;
                }
            }
        }

        // Sessions that never made it into the registry were not drained,
        // so they send their own sentinel.
        let last = if shutting_down && origin.is_none() {
            Outbound::Shutdown
        } else {
            Outbound::Close
        };
        if timeout(CLOSE_TIMEOUT, self.outbound.send(last)).await.is_err() {
            debug!(session = %self.id, "Outbound queue full at close");
        }

        if timeout(CLOSE_TIMEOUT, writer).await.is_err() {
            warn!(session = %self.id, "Writer did not finish in time");
        }
        self.reader.take();

        self.advance(SessionState::Closed);
        info!(session = %self.id, peer = %self.addr, "Client disconnected");
    }

    fn advance(&mut self, next: SessionState) {
        match self.state.transition(next) {
            Ok(state) => self.state = state,
            Err(e) => debug!(session = %self.id, error = %e, "Ignoring session transition"),
        }
    }
}

/// Drains a session's outbound queue onto its socket.
///
/// Exits after [`Outbound::Close`], after the shutdown sentinel, or on the
/// first write error. The socket is flushed and shut down on exit.
pub async fn run_writer(
    writer: OwnedWriteHalf,
    codec: WireCodec,
    mut outbound: OutboundReceiver,
    id: SessionId,
) {
    let mut sink = FramedWrite::new(writer, codec);

    while let Some(item) = outbound.recv().await {
        let (text, last) = match item {
            Outbound::Message(text) => (text, false),
            Outbound::Shutdown => (SHUTDOWN_SENTINEL.to_string(), true),
            Outbound::Close => break,
        };

        match timeout(WRITE_TIMEOUT, sink.send(text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(session = %id, error = %e, "Write failed");
                debug!(session = %id, "Session is send-only until its reader exits");
                break;
            }
            Err(_) => {
                warn!(session = %id, "Write timed out");
                debug!(session = %id, "Session is send-only until its reader exits");
                break;
            }
        }

        if last {
            break;
        }
    }

    outbound.close();
    match timeout(WRITE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(session = %id, error = %e, "Failed to close socket"),
        Err(_) => debug!(session = %id, "Timed out closing socket"),
    }
}
