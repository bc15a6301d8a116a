//! Session registry using Actor pattern.
//!
//! The registry is the authoritative set of active sessions and the owner
//! of the chat history. It receives commands via a tokio mpsc channel and
//! processes them sequentially, so name negotiation (duplicate scan plus
//! insert) is a single atomic step.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ SessionHandler  │────▶│  RegistryActor  │────▶│  Vec<Peer>      │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!         │                       │                       │
//!         │   RegistryCommand     │   snapshot            │  delivered
//!         │   (mpsc channel)      │   (oneshot reply)     │  outside the actor
//!         ▼                       ▼                       ▼
//!    Register/Rename        Vec<SessionEntry>,      per-session
//!    Remove/Drain           ChatHistory             outbound queues
//! ```

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;
mod peer;

pub use actor::{RegistryActor, MAX_SESSIONS};
pub use commands::{Registered, RegistryCommand, RegistryError, Renamed};
pub use handle::RegistryHandle;
pub use peer::{
    deliver_all, enqueue, outbound_channel, Outbound, OutboundReceiver, OutboundSender, Peer,
    OUTBOUND_BUFFER,
};

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor stops once every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use relayd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(50, 100);
///     let names = handle.names().await;
///     assert!(names.is_empty());
/// }
/// ```
pub fn spawn_registry(history_limit: usize, max_sessions: usize) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx, history_limit, max_sessions);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
