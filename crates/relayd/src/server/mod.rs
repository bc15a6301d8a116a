//! TCP chat server.
//!
//! The server:
//! - Listens on a TCP port for client connections
//! - Spawns a SessionHandler and a writer task for each client
//! - Routes chat, private messages and commands through the registry
//! - Shuts down in a fixed order so every client sees `SERVER_SHUTDOWN`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ SessionHandler  │────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └───────┬─────────┘     └─────────────────┘
//!         │ Router
//!         ▼
//! ┌─────────────────┐
//! │ outbound queues │
//! │ (writer tasks)  │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Session errors are logged and never stop the server

mod listener;
mod router;
mod session;
mod shutdown;

pub use router::{Origin, Router};
pub use session::{run_writer, SessionError, SessionHandler};
pub use shutdown::ShutdownReport;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::assistant::TextAssistant;
use crate::config::{ConfigError, ServerConfig};
use crate::registry::{spawn_registry, RegistryHandle};
use listener::Listener;
use shutdown::ShutdownCoordinator;

/// Multi-client chat relay.
///
/// # Example
///
/// ```no_run
/// use relayd::config::ServerConfig;
/// use relayd::server::ChatServer;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut server = ChatServer::new(ServerConfig::default());
///     let addr = server.start().await?;
///     println!("listening on {addr}");
///     tokio::signal::ctrl_c().await?;
///     server.stop().await?;
///     Ok(())
/// }
/// ```
pub struct ChatServer {
    config: ServerConfig,
    assistant: Option<Arc<dyn TextAssistant>>,
    running: Option<RunningServer>,
}

/// State that exists only between `start` and `stop`.
struct RunningServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    registry: RegistryHandle,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    listener_task: JoinHandle<()>,
}

impl ChatServer {
    /// Creates a stopped server.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            assistant: None,
            running: None,
        }
    }

    /// Enables `/ask`, `/positive_transform` and `/summarize`.
    pub fn with_assistant(mut self, assistant: Arc<dyn TextAssistant>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The bound address while running. Useful with port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Registry of the running server.
    pub fn registry(&self) -> Option<RegistryHandle> {
        self.running.as_ref().map(|r| r.registry.clone())
    }

    /// Binds the listener and starts accepting clients.
    ///
    /// # Errors
    ///
    /// - `ServerError::AlreadyRunning` if called twice without `stop`
    /// - `ServerError::Config` if the configuration is invalid
    /// - `ServerError::Bind` if the address cannot be bound; nothing is left running
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            warn!("Server is already running");
            return Err(ServerError::AlreadyRunning);
        }
        self.config.validate()?;

        let bind_addr = format!("{}:{}", self.config.bind_host, self.config.port);
        let listener = TcpListener::bind((self.config.bind_host.as_str(), self.config.port))
            .await
            .map_err(|e| ServerError::Bind {
                addr: bind_addr.clone(),
                error: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: bind_addr,
            error: e.to_string(),
        })?;

        let registry = spawn_registry(self.config.history_limit, self.config.max_clients);
        let running = Arc::new(AtomicBool::new(true));
        let shutdown = CancellationToken::new();
        let tasks = TaskTracker::new();
        let router = Router::new(registry.clone(), self.assistant.clone(), tasks.clone());

        let listener = Listener::new(
            listener,
            Arc::clone(&running),
            router,
            tasks.clone(),
            shutdown.clone(),
            self.config.framing,
            self.config.idle_timeout(),
        );
        let listener_task = tokio::spawn(listener.run());

        info!(
            addr = %local_addr,
            framing = %self.config.framing,
            max_clients = self.config.max_clients,
            "Chat server listening"
        );

        self.running = Some(RunningServer {
            local_addr,
            running,
            registry,
            shutdown,
            tasks,
            listener_task,
        });
        Ok(local_addr)
    }

    /// Notifies every client, closes every session and releases the port.
    ///
    /// # Errors
    ///
    /// - `ServerError::NotRunning` if the server was never started or is already stopped
    pub async fn stop(&mut self) -> Result<ShutdownReport, ServerError> {
        let Some(server) = self.running.take() else {
            warn!("Server is not running");
            return Err(ServerError::NotRunning);
        };

        info!(addr = %server.local_addr, "Stopping chat server");

        let coordinator = ShutdownCoordinator {
            running: server.running,
            registry: server.registry,
            shutdown: server.shutdown,
            tasks: server.tasks,
            local_addr: server.local_addr,
            timeout: self.config.shutdown_timeout(),
        };
        let report = coordinator.run(server.listener_task).await;

        info!(
            notified = report.notified,
            sessions = report.sessions,
            clean = report.listener_stopped && report.sessions_finished,
            "Chat server stopped"
        );
        Ok(report)
    }
}

impl Drop for ChatServer {
    fn drop(&mut self) {
        if let Some(server) = &self.running {
            server.running.store(false, Ordering::SeqCst);
            server.shutdown.cancel();
            server.listener_task.abort();
        }
    }
}

/// Errors that can occur while starting or stopping the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Server is already running")]
    AlreadyRunning,

    #[error("Server is not running")]
    NotRunning,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
