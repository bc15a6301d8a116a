//! Server-to-client message formats.

use std::fmt;

use relay_core::DisplayName;

use crate::Framing;

/// Sentinel sent to every client when the server tears down.
pub const SHUTDOWN_SENTINEL: &str = "SERVER_SHUTDOWN";

const SYSTEM_PREFIX: &str = "SYSTEM: ";
const SYSTEM_INFO_PREFIX: &str = "SYSTEM_INFO: ";
const SYSTEM_SUMMARY_PREFIX: &str = "SYSTEM_SUMMARY: ";
const AI_RESPONSE_PREFIX: &str = "AI_POSITIVE_RESPONSE:";
const AI_ANSWER_PREFIX: &str = "AI_ANSWER:";
const PRIVATE_FROM_PREFIX: &str = "(private from ";
const PRIVATE_TO_PREFIX: &str = "(private to ";

const FALLBACK_NOTICE: &str = "The requested username was invalid, so you have been named ";
const RENAMED_SELF_NOTICE: &str = "You are now known as ";
const NAME_TAKEN_MARKER: &str = "so you have been renamed to '";

/// A message sent from the server to a client.
///
/// [`fmt::Display`] renders the exact wire text; [`ServerMessage::parse`]
/// is its inverse for the client side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `SYSTEM: <text>` informational or error notice
    System(String),

    /// `SYSTEM_INFO: <text>` progress notice
    SystemInfo(String),

    /// `SYSTEM_SUMMARY: <text>` reply to a summary request
    Summary(String),

    /// `AI_POSITIVE_RESPONSE:<name> : <text>` transformed message
    AiResponse { name: String, text: String },

    /// `AI_ANSWER:<asker> : <text>` answer to a question asked with `/ask`
    AiAnswer { asker: String, text: String },

    /// `(private from <sender>): <text>`
    PrivateFrom { sender: String, text: String },

    /// `(private to <recipient>): <text>`
    PrivateTo { recipient: String, text: String },

    /// `<sender>: <text>` broadcast chat line
    Chat { sender: String, text: String },

    /// `SERVER_SHUTDOWN`
    Shutdown,

    /// Anything the parser could not classify
    Unknown(String),
}

impl ServerMessage {
    // ------------------------------------------------------------------
    // Lifecycle notices
    // ------------------------------------------------------------------

    pub fn joined(name: &DisplayName) -> Self {
        Self::System(format!("{name} has joined the chat."))
    }

    pub fn left(name: &DisplayName) -> Self {
        Self::System(format!("{name} has left the chat."))
    }

    pub fn fallback_name(name: &DisplayName) -> Self {
        Self::System(format!("{FALLBACK_NOTICE}{name}."))
    }

    pub fn name_taken(requested: &DisplayName, assigned: &DisplayName) -> Self {
        Self::System(format!(
            "The username '{requested}' is already in use, {NAME_TAKEN_MARKER}{assigned}'."
        ))
    }

    pub fn renamed_self(name: &DisplayName) -> Self {
        Self::System(format!("{RENAMED_SELF_NOTICE}{name}."))
    }

    pub fn renamed_other(old: &DisplayName, new: &DisplayName) -> Self {
        Self::System(format!("{old} is now known as {new}."))
    }

    pub fn server_full(max: usize) -> Self {
        Self::System(format!("The server is full ({max} users). Try again later."))
    }

    // ------------------------------------------------------------------
    // Routing results
    // ------------------------------------------------------------------

    pub fn chat(sender: &DisplayName, text: &str) -> Self {
        Self::Chat {
            sender: sender.to_string(),
            text: text.to_string(),
        }
    }

    pub fn private_from(sender: &DisplayName, text: &str) -> Self {
        Self::PrivateFrom {
            sender: sender.to_string(),
            text: text.to_string(),
        }
    }

    pub fn private_to(recipient: &DisplayName, text: &str) -> Self {
        Self::PrivateTo {
            recipient: recipient.to_string(),
            text: text.to_string(),
        }
    }

    pub fn user_list(names: &[DisplayName]) -> Self {
        if names.is_empty() {
            return Self::System("No users are currently connected.".to_string());
        }
        let joined = names
            .iter()
            .map(DisplayName::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self::System(format!("Connected users: {joined}"))
    }

    // ------------------------------------------------------------------
    // Errors reported to the sender
    // ------------------------------------------------------------------

    pub fn malformed_private(usage: &str) -> Self {
        Self::System(format!("Invalid private message format. Usage: {usage}"))
    }

    pub fn private_to_self() -> Self {
        Self::System("You cannot send a private message to yourself.".to_string())
    }

    pub fn user_not_found(name: &str) -> Self {
        Self::System(format!("User '{name}' was not found."))
    }

    pub fn decode_error() -> Self {
        Self::System(
            "The message could not be decoded. Only UTF-8 text is supported.".to_string(),
        )
    }

    pub fn unknown_command(name: &str) -> Self {
        Self::System(format!("Unknown command: /{name}. Type /help for a list of commands."))
    }

    pub fn help() -> Self {
        Self::System(
            "Commands: /w <user> <message>, /msg <user> <message>, /users, /nick <name>, \
             /ask <question>, /positive_transform <message>, /summarize, /help"
                .to_string(),
        )
    }

    // ------------------------------------------------------------------
    // Assistant commands
    // ------------------------------------------------------------------

    pub fn ai_unavailable() -> Self {
        Self::System("AI features are currently unavailable.".to_string())
    }

    pub fn usage(usage: &str) -> Self {
        Self::System(format!("Usage: {usage}"))
    }

    pub fn transform_pending() -> Self {
        Self::SystemInfo("Transforming your message, please wait...".to_string())
    }

    pub fn answer_pending() -> Self {
        Self::SystemInfo("Asking the assistant, please wait...".to_string())
    }

    pub fn summary_pending() -> Self {
        Self::SystemInfo("Generating a summary of the chat, please wait...".to_string())
    }

    pub fn nothing_to_summarize() -> Self {
        Self::System("There is no chat history to summarize yet.".to_string())
    }

    /// Classifies one received message.
    pub fn parse(raw: &str) -> Self {
        if raw.trim() == SHUTDOWN_SENTINEL {
            return Self::Shutdown;
        }
        if let Some(text) = raw.strip_prefix(SYSTEM_INFO_PREFIX) {
            return Self::SystemInfo(text.to_string());
        }
        if let Some(text) = raw.strip_prefix(SYSTEM_SUMMARY_PREFIX) {
            return Self::Summary(text.to_string());
        }
        if let Some(text) = raw.strip_prefix(SYSTEM_PREFIX) {
            return Self::System(text.to_string());
        }
        if let Some(rest) = raw.strip_prefix(AI_RESPONSE_PREFIX) {
            if let Some((name, text)) = rest.split_once(" : ") {
                return Self::AiResponse {
                    name: name.to_string(),
                    text: text.to_string(),
                };
            }
        }
        if let Some(rest) = raw.strip_prefix(AI_ANSWER_PREFIX) {
            if let Some((asker, text)) = rest.split_once(" : ") {
                return Self::AiAnswer {
                    asker: asker.to_string(),
                    text: text.to_string(),
                };
            }
        }
        if let Some(rest) = raw.strip_prefix(PRIVATE_FROM_PREFIX) {
            if let Some((sender, text)) = rest.split_once("): ") {
                return Self::PrivateFrom {
                    sender: sender.to_string(),
                    text: text.to_string(),
                };
            }
        }
        if let Some(rest) = raw.strip_prefix(PRIVATE_TO_PREFIX) {
            if let Some((recipient, text)) = rest.split_once("): ") {
                return Self::PrivateTo {
                    recipient: recipient.to_string(),
                    text: text.to_string(),
                };
            }
        }
        if let Some((sender, text)) = raw.split_once(": ") {
            return Self::Chat {
                sender: sender.to_string(),
                text: text.to_string(),
            };
        }
        Self::Unknown(raw.to_string())
    }

    /// The name a notice assigns to its recipient.
    ///
    /// Recognizes the fallback, duplicate-name and rename notices so a client
    /// can keep track of what the server calls it.
    pub fn assigned_name(&self) -> Option<&str> {
        let Self::System(text) = self else {
            return None;
        };
        if let Some(rest) = text.strip_prefix(FALLBACK_NOTICE) {
            return rest.strip_suffix('.');
        }
        if let Some(rest) = text.strip_prefix(RENAMED_SELF_NOTICE) {
            return rest.strip_suffix('.');
        }
        let (_, tail) = text.split_once(NAME_TAKEN_MARKER)?;
        tail.strip_suffix("'.")
    }

    /// Splits a trailing shutdown sentinel off one received frame.
    ///
    /// Returns the text that preceded the sentinel, or `None` when the frame
    /// is not a shutdown. With line framing the whole line must be the
    /// sentinel. With raw framing a notice written just before the sentinel
    /// can land in the same read, so the sentinel also counts when it follows
    /// a complete `SYSTEM` notice. Chat and private lines are user text and
    /// never end in a shutdown, whatever they contain.
    #[must_use]
    pub fn split_shutdown(frame: &str, framing: Framing) -> Option<&str> {
        let body = frame.trim();
        if body == SHUTDOWN_SENTINEL {
            return Some("");
        }
        if framing == Framing::Line {
            return None;
        }

        let prefix = body.strip_suffix(SHUTDOWN_SENTINEL)?;
        let is_notice = matches!(
            Self::parse(prefix),
            Self::System(_) | Self::SystemInfo(_)
        );
        // Notices end in punctuation; a name at the end could be anything.
        (is_notice && prefix.trim_end().ends_with('.')).then_some(prefix)
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System(text) => write!(f, "{SYSTEM_PREFIX}{text}"),
            Self::SystemInfo(text) => write!(f, "{SYSTEM_INFO_PREFIX}{text}"),
            Self::Summary(text) => write!(f, "{SYSTEM_SUMMARY_PREFIX}{text}"),
            Self::AiResponse { name, text } => write!(f, "{AI_RESPONSE_PREFIX}{name} : {text}"),
            Self::AiAnswer { asker, text } => write!(f, "{AI_ANSWER_PREFIX}{asker} : {text}"),
            Self::PrivateFrom { sender, text } => write!(f, "{PRIVATE_FROM_PREFIX}{sender}): {text}"),
            Self::PrivateTo { recipient, text } => {
                write!(f, "{PRIVATE_TO_PREFIX}{recipient}): {text}")
            }
            Self::Chat { sender, text } => write!(f, "{sender}: {text}"),
            Self::Shutdown => f.write_str(SHUTDOWN_SENTINEL),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

impl From<ServerMessage> for String {
    fn from(msg: ServerMessage) -> Self {
        msg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> DisplayName {
        DisplayName::new(s)
    }

    #[test]
    fn test_wire_formats() {
        assert_eq!(ServerMessage::chat(&name("Alice"), "hi").to_string(), "Alice: hi");
        assert_eq!(
            ServerMessage::private_from(&name("Alice"), "psst").to_string(),
            "(private from Alice): psst"
        );
        assert_eq!(
            ServerMessage::private_to(&name("Bob"), "psst").to_string(),
            "(private to Bob): psst"
        );
        assert_eq!(ServerMessage::Shutdown.to_string(), "SERVER_SHUTDOWN");
        assert_eq!(
            ServerMessage::SystemInfo("working".into()).to_string(),
            "SYSTEM_INFO: working"
        );
        assert_eq!(
            ServerMessage::AiResponse {
                name: "Bob".into(),
                text: "thanks!".into()
            }
            .to_string(),
            "AI_POSITIVE_RESPONSE:Bob : thanks!"
        );
    }

    #[test]
    fn test_user_list_formats() {
        assert_eq!(
            ServerMessage::user_list(&[name("Alice"), name("Bob")]).to_string(),
            "SYSTEM: Connected users: Alice, Bob"
        );
        assert_eq!(
            ServerMessage::user_list(&[]).to_string(),
            "SYSTEM: No users are currently connected."
        );
    }

    #[test]
    fn test_parse_classifies_each_kind() {
        assert_eq!(ServerMessage::parse("SERVER_SHUTDOWN"), ServerMessage::Shutdown);
        assert_eq!(
            ServerMessage::parse("SYSTEM: Bob has joined the chat."),
            ServerMessage::System("Bob has joined the chat.".into())
        );
        assert_eq!(
            ServerMessage::parse("SYSTEM_INFO: please wait"),
            ServerMessage::SystemInfo("please wait".into())
        );
        assert_eq!(
            ServerMessage::parse("AI_ANSWER:Alice : Paris"),
            ServerMessage::AiAnswer {
                asker: "Alice".into(),
                text: "Paris".into()
            }
        );
        assert_eq!(
            ServerMessage::parse("(private from Alice): hey"),
            ServerMessage::PrivateFrom {
                sender: "Alice".into(),
                text: "hey".into()
            }
        );
        assert_eq!(
            ServerMessage::parse("Alice: hello: world"),
            ServerMessage::Chat {
                sender: "Alice".into(),
                text: "hello: world".into()
            }
        );
        assert_eq!(
            ServerMessage::parse("no separator"),
            ServerMessage::Unknown("no separator".into())
        );
    }

    #[test]
    fn test_shutdown_sentinel_alone() {
        for framing in [Framing::Raw, Framing::Line] {
            assert_eq!(ServerMessage::split_shutdown("SERVER_SHUTDOWN", framing), Some(""));
            assert_eq!(ServerMessage::split_shutdown(" SERVER_SHUTDOWN\r\n", framing), Some(""));
        }
    }

    #[test]
    fn test_shutdown_after_notice_in_raw_read() {
        let chunk = "SYSTEM: Bob has joined the chat.SERVER_SHUTDOWN";
        assert_eq!(
            ServerMessage::split_shutdown(chunk, Framing::Raw),
            Some("SYSTEM: Bob has joined the chat.")
        );
        assert_eq!(ServerMessage::split_shutdown(chunk, Framing::Line), None);
    }

    #[test]
    fn test_user_text_never_ends_in_shutdown() {
        let chunks = [
            "Bob: what does SERVER_SHUTDOWN mean?",
            "Bob: SERVER_SHUTDOWN",
            "Bob: bye.SERVER_SHUTDOWN",
            "(private from Bob): SERVER_SHUTDOWN",
            "SYSTEM: Connected users: Alice, SERVER_SHUTDOWN",
            "SERVER_SHUTDOWN is a word",
        ];
        for chunk in chunks {
            for framing in [Framing::Raw, Framing::Line] {
                assert_eq!(ServerMessage::split_shutdown(chunk, framing), None, "{chunk}");
            }
        }
    }

    #[test]
    fn test_assigned_name_from_notices() {
        let cases = [
            ServerMessage::fallback_name(&name("User5123")),
            ServerMessage::name_taken(&name("Alice"), &name("User5123")),
            ServerMessage::renamed_self(&name("User5123")),
        ];
        for notice in &cases {
            let parsed = ServerMessage::parse(&notice.to_string());
            assert_eq!(parsed.assigned_name(), Some("User5123"), "{notice}");
        }

        assert_eq!(ServerMessage::joined(&name("Bob")).assigned_name(), None);
        assert_eq!(ServerMessage::chat(&name("Bob"), "You are now known as X.").assigned_name(), None);
    }
}
