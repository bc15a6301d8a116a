//! Terminal rendering of server messages.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};
use relay_protocol::{parse_client_message, ClientCommand, ServerMessage};

/// Formats a message for the terminal with a `[HH:MM:SS]` prefix.
///
/// Chat lines from `own_name` are shown as `You:`.
pub fn render<Tz>(msg: &ServerMessage, own_name: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let ts = at.format("%H:%M:%S");
    match msg {
        ServerMessage::System(text) => format!("[{ts}] * {text}"),
        ServerMessage::SystemInfo(text) => format!("[{ts}] ... {text}"),
        ServerMessage::Summary(text) => format!("[{ts}] Summary: {text}"),
        ServerMessage::AiResponse { name, text } => format!("[{ts}] {name} (positive): {text}"),
        ServerMessage::AiAnswer { asker, text } => {
            format!("[{ts}] Assistant (to {asker}): {text}")
        }
        ServerMessage::PrivateFrom { sender, text } => format!("[{ts}] [PM from {sender}] {text}"),
        ServerMessage::PrivateTo { recipient, text } => {
            format!("[{ts}] [PM to {recipient}] {text}")
        }
        ServerMessage::Chat { sender, text } if sender == own_name => format!("[{ts}] You: {text}"),
        ServerMessage::Chat { sender, text } => format!("[{ts}] {sender}: {text}"),
        ServerMessage::Shutdown => format!("[{ts}] * The server is shutting down."),
        ServerMessage::Unknown(raw) => format!("[{ts}] {raw}"),
    }
}

/// The line to show locally after sending `input`.
///
/// The server never echoes a broadcast to its sender, so plain chat is
/// echoed here. Commands and private messages get their own replies.
pub fn local_echo(input: &str, own_name: &str) -> Option<ServerMessage> {
    match parse_client_message(input) {
        Ok(ClientCommand::Broadcast(text)) => Some(ServerMessage::Chat {
            sender: own_name.to_string(),
            text,
        }),
        _ => None,
    }
}
