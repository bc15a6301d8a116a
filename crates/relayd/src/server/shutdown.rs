//! Coordinated server shutdown.
//!
//! Order matters:
//! 1. clear the running flag so the accept loop stops taking clients
//! 2. drain the registry, which also refuses late registrations
//! 3. queue `SERVER_SHUTDOWN` on every drained session
//! 4. cancel the session tokens; read loops exit, writers finish after the sentinel
//! 5. wake the blocked `accept()` with a loopback connection
//! 6. join the listener, then every session task, each with a bounded wait

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::registry::RegistryHandle;

/// Timeout for the self-connection that unblocks `accept()`
const WAKE_TIMEOUT: Duration = Duration::from_millis(100);

/// What happened during a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions that were sent the shutdown sentinel
    pub notified: usize,
    /// Sessions registered when shutdown began
    pub sessions: usize,
    /// Whether the accept loop exited on its own
    pub listener_stopped: bool,
    /// Whether every session task finished within the timeout
    pub sessions_finished: bool,
}

pub(crate) struct ShutdownCoordinator {
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) registry: RegistryHandle,
    pub(crate) shutdown: CancellationToken,
    pub(crate) tasks: TaskTracker,
    pub(crate) local_addr: SocketAddr,
    pub(crate) timeout: Duration,
}

impl ShutdownCoordinator {
    pub(crate) async fn run(self, listener_task: JoinHandle<()>) -> ShutdownReport {
        self.running.store(false, Ordering::SeqCst);

        let peers = self.registry.drain().await;
        let mut notified = 0;
        for peer in &peers {
            if peer.send_shutdown().await {
                notified += 1;
            }
        }
        info!(sessions = peers.len(), notified, "Shutdown sentinel queued");

        self.shutdown.cancel();
        wake_listener(self.local_addr).await;

        let listener_stopped = join_listener(listener_task, self.timeout).await;

        self.tasks.close();
        let sessions_finished = match timeout(self.timeout, self.tasks.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(remaining = self.tasks.len(), "Session tasks did not finish in time");
                false
            }
        };

        ShutdownReport {
            notified,
            sessions: peers.len(),
            listener_stopped,
            sessions_finished,
        }
    }
}

/// Where to connect to reach a listener bound at `local`.
fn wake_address(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}

async fn wake_listener(local: SocketAddr) {
    let target = wake_address(local);
    match timeout(WAKE_TIMEOUT, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => debug!(target = %target, "Woke accept loop"),
        Ok(Err(e)) => debug!(target = %target, error = %e, "Wake-up connection failed"),
        Err(_) => debug!(target = %target, "Wake-up connection timed out"),
    }
}

async fn join_listener(mut task: JoinHandle<()>, limit: Duration) -> bool {
    match timeout(limit, &mut task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "Listener task failed");
            true
        }
        Err(_) => {
            warn!("Listener did not stop in time, aborting");
            task.abort();
            false
        }
    }
}
