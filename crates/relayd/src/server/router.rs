//! Message routing between sessions.
//!
//! The router turns a classified [`ClientCommand`] into deliveries. It asks
//! the registry for a snapshot of recipients, then pushes rendered messages
//! onto their outbound queues outside the actor. A failed delivery is logged
//! for that recipient and never aborts the rest of the fan-out.

use std::sync::Arc;

use relay_core::{DisplayName, NameRequest, SessionId};
use relay_protocol::{ClientCommand, ServerMessage};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::assistant::{
    AssistantError, TextAssistant, SUMMARY_HISTORY_LINES, TRANSFORM_CONTEXT_LINES,
};
use crate::registry::{deliver_all, enqueue, OutboundSender, RegistryHandle};

/// The session a command came from.
#[derive(Debug, Clone)]
pub struct Origin {
    pub id: SessionId,
    pub name: DisplayName,
    pub outbound: OutboundSender,
}

impl Origin {
    pub fn new(id: SessionId, name: DisplayName, outbound: OutboundSender) -> Self {
        Self { id, name, outbound }
    }

    /// Queues a reply to this session only.
    pub fn reply(&self, msg: ServerMessage) -> bool {
        enqueue(&self.outbound, &msg, &self.name)
    }
}

/// Routes client commands to their recipients.
#[derive(Clone)]
pub struct Router {
    registry: RegistryHandle,
    assistant: Option<Arc<dyn TextAssistant>>,
    tasks: TaskTracker,
}

impl Router {
    /// Creates a router.
    ///
    /// Assistant calls run on `tasks` so shutdown can wait for them.
    pub fn new(
        registry: RegistryHandle,
        assistant: Option<Arc<dyn TextAssistant>>,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            registry,
            assistant,
            tasks,
        }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Handles one classified client message.
    pub async fn dispatch(&self, origin: &mut Origin, command: ClientCommand) {
        match command {
            ClientCommand::Broadcast(text) => {
                self.broadcast_chat(origin, &text).await;
            }
            ClientCommand::Private { recipient, text } => {
                self.send_private(origin, &recipient, &text).await;
            }
            ClientCommand::ListUsers => self.list_users(origin).await,
            ClientCommand::Command { name, args } => self.run_command(origin, &name, &args).await,
        }
    }

    /// Records `text` in history and relays it to every other session.
    ///
    /// Returns the number of successful deliveries.
    pub async fn broadcast_chat(&self, origin: &Origin, text: &str) -> usize {
        let msg = ServerMessage::chat(&origin.name, text);
        let peers = self
            .registry
            .broadcast(Some(origin.id), msg.to_string())
            .await;
        let delivered = deliver_all(&peers, &msg);

        debug!(
            session = %origin.id,
            sender = %origin.name,
            recipients = peers.len(),
            delivered,
            "Broadcast chat message"
        );
        delivered
    }

    /// Sends a notice to every session except `exclude`. Not recorded in history.
    pub async fn announce(&self, exclude: Option<SessionId>, msg: ServerMessage) -> usize {
        let peers = self.registry.snapshot(exclude).await;
        deliver_all(&peers, &msg)
    }

    pub async fn announce_join(&self, id: SessionId, name: &DisplayName) -> usize {
        self.announce(Some(id), ServerMessage::joined(name)).await
    }

    /// Announces a departure. The leaving session is already out of the registry.
    pub async fn announce_leave(&self, name: &DisplayName) -> usize {
        self.announce(None, ServerMessage::left(name)).await
    }

    /// Delivers a private message and confirms it to the sender.
    pub async fn send_private(&self, origin: &Origin, recipient: &str, text: &str) {
        match self.registry.lookup(recipient).await {
            Some(peer) if peer.id == origin.id => {
                debug!(session = %origin.id, "Rejected private message to self");
                origin.reply(ServerMessage::private_to_self());
            }
            Some(peer) => {
                peer.deliver(&ServerMessage::private_from(&origin.name, text));
                origin.reply(ServerMessage::private_to(&peer.name, text));
                info!(sender = %origin.name, recipient = %peer.name, "Private message routed");
            }
            None => {
                warn!(sender = %origin.name, recipient, "Private message recipient not found");
                origin.reply(ServerMessage::user_not_found(recipient));
            }
        }
    }

    pub async fn list_users(&self, origin: &Origin) {
        let names = self.registry.names().await;
        origin.reply(ServerMessage::user_list(&names));
    }

    async fn run_command(&self, origin: &mut Origin, name: &str, args: &str) {
        debug!(session = %origin.id, command = name, "Running command");
        match name {
            "nick" => self.rename(origin, args).await,
            "ask" => self.ask(origin, args).await,
            "positive_transform" => self.positive_transform(origin, args).await,
            "summarize" => self.summarize(origin).await,
            "help" => {
                origin.reply(ServerMessage::help());
            }
            other => {
                origin.reply(ServerMessage::unknown_command(other));
            }
        }
    }

    // ------------------------------------------------------------------
    // /nick
    // ------------------------------------------------------------------

    async fn rename(&self, origin: &mut Origin, args: &str) {
        let requested = match NameRequest::for_rename(args) {
            Ok(name) => name,
            Err(e) => {
                origin.reply(ServerMessage::System(e.to_string()));
                return;
            }
        };

        match self.registry.rename(origin.id, requested).await {
            Ok(renamed) if renamed.old == renamed.new => {
                origin.reply(ServerMessage::System(format!(
                    "You are already known as {}.",
                    renamed.new
                )));
            }
            Ok(renamed) => {
                origin.name = renamed.new.clone();
                origin.reply(ServerMessage::renamed_self(&renamed.new));
                self.announce(
                    Some(origin.id),
                    ServerMessage::renamed_other(&renamed.old, &renamed.new),
                )
                .await;
                info!(session = %origin.id, old = %renamed.old, new = %renamed.new, "Session renamed");
            }
            Err(e) => {
                warn!(session = %origin.id, error = %e, "Rename failed");
                origin.reply(ServerMessage::System(format!("Cannot change name: {e}")));
            }
        }
    }

    // ------------------------------------------------------------------
    // Assistant commands
    // ------------------------------------------------------------------

    async fn positive_transform(&self, origin: &Origin, args: &str) {
        let Some(assistant) = self.assistant.clone() else {
            origin.reply(ServerMessage::ai_unavailable());
            return;
        };
        let text = args.trim();
        if text.is_empty() {
            origin.reply(ServerMessage::usage("/positive_transform <message>"));
            return;
        }

        origin.reply(ServerMessage::transform_pending());
        let context = self.registry.history(TRANSFORM_CONTEXT_LINES).await;
        let registry = self.registry.clone();
        let requester = origin.clone();
        let text = text.to_string();

        self.tasks.spawn(async move {
            match assistant.transform(&text, &context).await.and_then(non_empty) {
                Ok(result) => {
                    let line = format!("{} : {}", requester.name, result);
                    let msg = ServerMessage::AiResponse {
                        name: requester.name.to_string(),
                        text: result,
                    };
                    let delivered = broadcast_to_all(&registry, line, &msg).await;
                    info!(session = %requester.id, delivered, "Broadcast transformed message");
                }
                Err(e) => {
                    warn!(session = %requester.id, error = %e, "Transform failed");
                    requester.reply(ServerMessage::System(format!("AI transformation failed: {e}")));
                }
            }
        });
    }

    async fn ask(&self, origin: &Origin, args: &str) {
        let Some(assistant) = self.assistant.clone() else {
            origin.reply(ServerMessage::ai_unavailable());
            return;
        };
        let question = args.trim();
        if question.is_empty() {
            origin.reply(ServerMessage::usage("/ask <question>"));
            return;
        }

        origin.reply(ServerMessage::answer_pending());
        let registry = self.registry.clone();
        let requester = origin.clone();
        let question = question.to_string();

        self.tasks.spawn(async move {
            match assistant.ask(&question).await.and_then(non_empty) {
                Ok(answer) => {
                    let line = format!("Assistant: {answer}");
                    let msg = ServerMessage::AiAnswer {
                        asker: requester.name.to_string(),
                        text: answer,
                    };
                    let delivered = broadcast_to_all(&registry, line, &msg).await;
                    info!(session = %requester.id, delivered, "Broadcast assistant answer");
                }
                Err(e) => {
                    warn!(session = %requester.id, error = %e, "Question failed");
                    requester.reply(ServerMessage::System(format!("AI question failed: {e}")));
                }
            }
        });
    }

    async fn summarize(&self, origin: &Origin) {
        let Some(assistant) = self.assistant.clone() else {
            origin.reply(ServerMessage::ai_unavailable());
            return;
        };
        let history = self.registry.history(SUMMARY_HISTORY_LINES).await;
        if history.is_empty() {
            origin.reply(ServerMessage::nothing_to_summarize());
            return;
        }

        origin.reply(ServerMessage::summary_pending());
        let requester = origin.clone();

        self.tasks.spawn(async move {
            match assistant.summarize(&history).await.and_then(non_empty) {
                Ok(summary) => {
                    requester.reply(ServerMessage::Summary(summary));
                }
                Err(e) => {
                    warn!(session = %requester.id, error = %e, "Summary failed");
                    requester.reply(ServerMessage::System(format!("Summary failed: {e}")));
                }
            }
        });
    }
}

/// Records `line` in history and delivers `msg` to every session, the requester included.
async fn broadcast_to_all(registry: &RegistryHandle, line: String, msg: &ServerMessage) -> usize {
    let peers = registry.broadcast(None, line).await;
    deliver_all(&peers, msg)
}

fn non_empty(text: String) -> Result<String, AssistantError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(AssistantError::EmptyResponse)
    } else {
        Ok(trimmed.to_string())
    }
}
