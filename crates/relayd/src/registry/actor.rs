//! Registry actor - owns all session state and processes commands.
//!
//! The RegistryActor is the single owner of the session list and the chat
//! history. It receives commands via an mpsc channel and handles them one
//! at a time, which serializes every read-modify-write.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Response send failures are ignored (the caller went away)

use std::net::SocketAddr;

use relay_core::{ChatHistory, DisplayName, NameRequest, SessionId, SessionInfo};
use relay_protocol::ServerMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::commands::{Registered, RegistryCommand, RegistryError, Renamed};
use super::peer::{enqueue, OutboundSender, Peer};

/// Default maximum number of sessions the registry can hold.
pub const MAX_SESSIONS: usize = 100;

/// A registered session.
struct SessionEntry {
    info: SessionInfo,
    outbound: OutboundSender,
}

impl SessionEntry {
    fn peer(&self) -> Peer {
        Peer {
            id: self.info.id,
            name: self.info.name.clone(),
            outbound: self.outbound.clone(),
        }
    }
}

/// The registry actor - owns all session state.
///
/// Sessions are kept in a `Vec` in registration order; user lists and
/// snapshots follow that order.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Registered sessions, oldest first
    sessions: Vec<SessionEntry>,

    /// Recent broadcast lines
    history: ChatHistory,

    /// Capacity limit
    max_sessions: usize,

    /// Set by `Drain`; no registrations are accepted afterwards
    draining: bool,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        history_limit: usize,
        max_sessions: usize,
    ) -> Self {
        Self {
            receiver,
            sessions: Vec::new(),
            history: ChatHistory::new(history_limit),
            max_sessions,
            draining: false,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    pub async fn run(mut self) {
        info!(max_sessions = self.max_sessions, "Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(sessions = self.sessions.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                id,
                addr,
                request,
                outbound,
                respond_to,
            } => {
                let result = self.handle_register(id, addr, request, outbound);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Rename {
                id,
                name,
                respond_to,
            } => {
                let result = self.handle_rename(id, name);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Remove { id, respond_to } => {
                let _ = respond_to.send(self.handle_remove(id));
            }
            RegistryCommand::Lookup { name, respond_to } => {
                let found = self
                    .sessions
                    .iter()
                    .find(|entry| entry.info.name == name.as_str())
                    .map(SessionEntry::peer);
                let _ = respond_to.send(found);
            }
            RegistryCommand::Snapshot {
                exclude,
                respond_to,
            } => {
                let _ = respond_to.send(self.snapshot(exclude));
            }
            RegistryCommand::Broadcast {
                exclude,
                history_line,
                respond_to,
            } => {
                if let Some(evicted) = self.history.push(history_line) {
                    debug!(evicted = %evicted, "History full, dropped oldest line");
                }
                let _ = respond_to.send(self.snapshot(exclude));
            }
            RegistryCommand::ListNames { respond_to } => {
                let names = self
                    .sessions
                    .iter()
                    .map(|entry| entry.info.name.clone())
                    .collect();
                let _ = respond_to.send(names);
            }
            RegistryCommand::History { last, respond_to } => {
                let _ = respond_to.send(self.history.recent(last));
            }
            RegistryCommand::Drain { respond_to } => {
                let _ = respond_to.send(self.handle_drain());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Negotiates a unique name and inserts the session.
    ///
    /// Duplicate resolution, notice queuing and insertion all happen inside
    /// this one command, so two connections asking for the same name can
    /// never both get it.
    fn handle_register(
        &mut self,
        id: SessionId,
        addr: SocketAddr,
        request: NameRequest,
        outbound: OutboundSender,
    ) -> Result<Registered, RegistryError> {
        if self.draining {
            return Err(RegistryError::ShuttingDown);
        }

        if self.sessions.len() >= self.max_sessions {
            warn!(
                session = %id,
                current = self.sessions.len(),
                max = self.max_sessions,
                "Registry is full, rejecting registration"
            );
            return Err(RegistryError::RegistryFull {
                max: self.max_sessions,
            });
        }

        if self.position(id).is_some() {
            return Err(RegistryError::SessionAlreadyExists(id));
        }

        if request.replaced {
            debug!(session = %id, requested = ?request.requested, fallback = %request.name, "Replaced unusable name");
            enqueue(&outbound, &ServerMessage::fallback_name(&request.name), &request.name);
        }

        let requested = request.name;
        let name = requested.clone().deduplicate(|candidate| self.is_taken(candidate));
        if name != requested {
            debug!(session = %id, requested = %requested, assigned = %name, "Name taken, suffixed");
            enqueue(&outbound, &ServerMessage::name_taken(&requested, &name), &name);
        }

        self.sessions.push(SessionEntry {
            info: SessionInfo::new(id, name.clone(), addr),
            outbound,
        });

        info!(
            session = %id,
            name = %name,
            addr = %addr,
            total_sessions = self.sessions.len(),
            "Session registered"
        );

        Ok(Registered { name })
    }

    fn handle_rename(&mut self, id: SessionId, name: DisplayName) -> Result<Renamed, RegistryError> {
        let index = self.position(id).ok_or(RegistryError::SessionNotFound(id))?;

        // The session's own current name does not count as taken.
        let name = name.deduplicate(|candidate| {
            self.sessions
                .iter()
                .any(|entry| entry.info.id != id && entry.info.name == candidate)
        });

        let entry = self
            .sessions
            .get_mut(index)
            .ok_or(RegistryError::SessionNotFound(id))?;
        let old = std::mem::replace(&mut entry.info.name, name.clone());

        info!(session = %id, old = %old, new = %name, "Session renamed");
        Ok(Renamed { old, new: name })
    }

    fn handle_remove(&mut self, id: SessionId) -> Option<SessionInfo> {
        let index = self.position(id)?;
        let entry = self.sessions.remove(index);

        info!(
            session = %id,
            name = %entry.info.name,
            connected_secs = entry.info.connected_secs(),
            total_sessions = self.sessions.len(),
            "Session removed"
        );

        Some(entry.info)
    }

    fn handle_drain(&mut self) -> Vec<Peer> {
        self.draining = true;
        let peers: Vec<Peer> = self.sessions.iter().map(SessionEntry::peer).collect();
        self.sessions.clear();

        info!(drained = peers.len(), "Registry drained for shutdown");
        peers
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn position(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|entry| entry.info.id == id)
    }

    fn is_taken(&self, candidate: &str) -> bool {
        self.sessions.iter().any(|entry| entry.info.name == candidate)
    }

    fn snapshot(&self, exclude: Option<SessionId>) -> Vec<Peer> {
        self.sessions
            .iter()
            .filter(|entry| Some(entry.info.id) != exclude)
            .map(SessionEntry::peer)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::peer::{outbound_channel, Outbound, OutboundReceiver};
    use tokio::sync::oneshot;

    fn actor() -> RegistryActor {
        let (_tx, rx) = mpsc::channel(1);
        RegistryActor::new(rx, 50, 3)
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn register(
        actor: &mut RegistryActor,
        id: u64,
        raw: &str,
    ) -> (Result<Registered, RegistryError>, OutboundReceiver) {
        let (tx, rx) = outbound_channel();
        let port = 40000 + id as u16;
        let result = actor.handle_register(
            SessionId::new(id),
            addr(port),
            NameRequest::from_handshake(Some(raw), port),
            tx,
        );
        (result, rx)
    }

    #[test]
    fn test_register_unique_name() {
        let mut actor = actor();
        let (result, mut rx) = register(&mut actor, 1, "Alice");
        assert_eq!(result.unwrap().name, "Alice");
        assert!(rx.try_recv().is_err(), "no notice for an accepted name");
    }

    #[test]
    fn test_duplicate_gets_suffix_and_notice() {
        let mut actor = actor();
        let _ = register(&mut actor, 1, "Alice");
        let (result, mut rx) = register(&mut actor, 2, "Alice");

        assert_eq!(result.unwrap().name, "Alice_1");
        match rx.try_recv() {
            Ok(Outbound::Message(text)) => {
                assert!(text.starts_with("SYSTEM: "));
                assert!(text.contains("'Alice'"));
                assert!(text.contains("'Alice_1'"));
            }
            other => panic!("expected rename notice, got {other:?}"),
        }
    }

    #[test]
    fn test_reserved_name_never_suffixed() {
        let mut actor = actor();
        let (result, mut rx) = register(&mut actor, 1, "SYSTEM");
        let name = result.unwrap().name;

        assert_eq!(name, "User40001");
        assert!(!name.as_str().starts_with("SYSTEM"));
        assert!(matches!(rx.try_recv(), Ok(Outbound::Message(t)) if t.contains("User40001")));
    }

    #[test]
    fn test_registry_full() {
        let mut actor = actor();
        for i in 0..3 {
            assert!(register(&mut actor, i, &format!("u{i}")).0.is_ok());
        }
        let (result, _) = register(&mut actor, 9, "late");
        assert_eq!(result.unwrap_err(), RegistryError::RegistryFull { max: 3 });
    }

    #[test]
    fn test_rename_keeps_own_name_free() {
        let mut actor = actor();
        let _ = register(&mut actor, 1, "Alice");
        let _ = register(&mut actor, 2, "Bob");

        let renamed = actor
            .handle_rename(SessionId::new(1), DisplayName::new("Alice"))
            .unwrap();
        assert_eq!(renamed.new, "Alice");

        let renamed = actor
            .handle_rename(SessionId::new(1), DisplayName::new("Bob"))
            .unwrap();
        assert_eq!(renamed.old, "Alice");
        assert_eq!(renamed.new, "Bob_1");
    }

    #[test]
    fn test_drain_refuses_later_registrations() {
        let mut actor = actor();
        let _ = register(&mut actor, 1, "Alice");

        let drained = actor.handle_drain();
        assert_eq!(drained.len(), 1);
        assert!(actor.handle_remove(SessionId::new(1)).is_none());

        let (result, _) = register(&mut actor, 2, "Bob");
        assert_eq!(result.unwrap_err(), RegistryError::ShuttingDown);
    }

    #[test]
    fn test_broadcast_records_history_and_excludes_sender() {
        let mut actor = actor();
        let _ = register(&mut actor, 1, "Alice");
        let _ = register(&mut actor, 2, "Bob");

        let (tx, mut rx) = oneshot::channel();
        actor.handle_command(RegistryCommand::Broadcast {
            exclude: Some(SessionId::new(1)),
            history_line: "Alice: hi".to_string(),
            respond_to: tx,
        });

        let peers = rx.try_recv().unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].name, "Bob");
        assert_eq!(actor.history.recent(5), vec!["Alice: hi"]);
    }
}
