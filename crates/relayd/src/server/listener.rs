//! TCP accept loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_core::SessionId;
use relay_protocol::{Framing, WireCodec};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use super::router::Router;
use super::session::{run_writer, SessionHandler};
use crate::registry::outbound_channel;

/// Pause after a failed accept before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and spawns a session per client.
pub(crate) struct Listener {
    listener: TcpListener,
    running: Arc<AtomicBool>,
    router: Router,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    framing: Framing,
    idle_timeout: Option<Duration>,
    next_id: u64,
}

impl Listener {
    pub(crate) fn new(
        listener: TcpListener,
        running: Arc<AtomicBool>,
        router: Router,
        tasks: TaskTracker,
        shutdown: CancellationToken,
        framing: Framing,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            listener,
            running,
            router,
            tasks,
            shutdown,
            framing,
            idle_timeout,
            next_id: 1,
        }
    }

    /// Runs until the running flag is cleared.
    ///
    /// A blocked `accept()` is released by the shutdown path connecting to
    /// the listener once; that connection is dropped unanswered.
    pub(crate) async fn run(mut self) {
        debug!("Accept loop started");

        while self.running.load(Ordering::SeqCst) {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    if !self.running.load(Ordering::SeqCst) {
                        debug!(peer = %addr, "Connection accepted during shutdown, closing");
                        break;
                    }
                    self.spawn_session(stream, addr);
                }
                Err(e) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break;
                    }
                    error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }

        info!("Accept loop stopped");
    }

    fn spawn_session(&mut self, stream: TcpStream, addr: SocketAddr) {
        let id = SessionId::new(self.next_id);
        self.next_id += 1;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(session = %id, error = %e, "Failed to set TCP_NODELAY");
        }

        let codec = WireCodec::new(self.framing);
        let (read_half, write_half) = stream.into_split();
        let (outbound_tx, outbound_rx) = outbound_channel();

        let writer = self
            .tasks
            .spawn(run_writer(write_half, codec, outbound_rx, id));

        let handler = SessionHandler::new(
            id,
            addr,
            FramedRead::new(read_half, codec),
            outbound_tx,
            self.router.clone(),
            self.shutdown.child_token(),
            self.idle_timeout,
        );
        self.tasks.spawn(handler.run(writer));

        debug!(session = %id, peer = %addr, "Session spawned");
    }
}
