//! Classification of client input.
//!
//! Every decoded message is turned into exactly one [`ClientCommand`],
//! checked in this order:
//!
//! 1. `/w ` or `/msg ` prefix (case-sensitive) → [`ClientCommand::Private`]
//! 2. `/users` after trimming, any case → [`ClientCommand::ListUsers`]
//! 3. any other leading `/` → [`ClientCommand::Command`]
//! 4. anything else → [`ClientCommand::Broadcast`]

use crate::ProtocolError;

/// Usage hint sent back when a private message is malformed.
pub const PRIVATE_USAGE: &str = "/w <username> <message>";

const PRIVATE_PREFIXES: [&str; 2] = ["/w ", "/msg "];

/// A classified client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Ordinary chat text for everyone else
    Broadcast(String),

    /// One-to-one message
    Private {
        /// Exact display name of the recipient
        recipient: String,
        /// Everything after the recipient, unmodified
        text: String,
    },

    /// Request for the connected-user list
    ListUsers,

    /// Extension-point command, e.g. `/nick Bob`
    Command {
        /// Lowercased command name without the leading slash
        name: String,
        /// Remainder of the message with leading whitespace removed
        args: String,
    },
}

/// Classifies one decoded message.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPrivate`] when a `/w` or `/msg`
/// message does not carry both a recipient and a text.
pub fn parse_client_message(message: &str) -> Result<ClientCommand, ProtocolError> {
    if PRIVATE_PREFIXES.iter().any(|p| message.starts_with(p)) {
        return parse_private(message);
    }

    let trimmed = message.trim();
    if trimmed.eq_ignore_ascii_case("/users") {
        return Ok(ClientCommand::ListUsers);
    }

    if let Some(rest) = trimmed.strip_prefix('/') {
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim_start()),
            None => (rest, ""),
        };
        return Ok(ClientCommand::Command {
            name: name.to_lowercase(),
            args: args.to_string(),
        });
    }

    Ok(ClientCommand::Broadcast(message.to_string()))
}

/// Splits `/w name text` on single spaces into at most three tokens.
fn parse_private(message: &str) -> Result<ClientCommand, ProtocolError> {
    let mut parts = message.splitn(3, ' ');
    let _command = parts.next();

    match (parts.next(), parts.next()) {
        (Some(recipient), Some(text)) => Ok(ClientCommand::Private {
            recipient: recipient.to_string(),
            text: text.to_string(),
        }),
        _ => Err(ProtocolError::MalformedPrivate(format!(
            "expected {PRIVATE_USAGE}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_broadcast() {
        assert_eq!(
            parse_client_message("hello there").unwrap(),
            ClientCommand::Broadcast("hello there".to_string())
        );
    }

    #[test]
    fn test_whisper_and_msg_forms() {
        assert_eq!(
            parse_client_message("/w Bob hi there").unwrap(),
            ClientCommand::Private {
                recipient: "Bob".to_string(),
                text: "hi there".to_string(),
            }
        );
        assert_eq!(
            parse_client_message("/msg Alice  spaced  out").unwrap(),
            ClientCommand::Private {
                recipient: "Alice".to_string(),
                text: " spaced  out".to_string(),
            }
        );
    }

    #[test]
    fn test_private_without_text_is_rejected() {
        assert!(matches!(
            parse_client_message("/w Bob"),
            Err(ProtocolError::MalformedPrivate(_))
        ));
    }

    #[test]
    fn test_private_prefix_is_case_sensitive() {
        assert_eq!(
            parse_client_message("/W Bob hi").unwrap(),
            ClientCommand::Command {
                name: "w".to_string(),
                args: "Bob hi".to_string(),
            }
        );
    }

    #[test]
    fn test_bare_w_is_a_command_not_a_private_message() {
        // No trailing space, so the private prefix does not match.
        assert_eq!(
            parse_client_message("/w").unwrap(),
            ClientCommand::Command {
                name: "w".to_string(),
                args: String::new(),
            }
        );
    }

    #[test]
    fn test_users_ignores_case_and_whitespace() {
        assert_eq!(parse_client_message("/users").unwrap(), ClientCommand::ListUsers);
        assert_eq!(parse_client_message("  /USERS \n").unwrap(), ClientCommand::ListUsers);
        assert!(matches!(
            parse_client_message("/users now").unwrap(),
            ClientCommand::Command { .. }
        ));
    }

    #[test]
    fn test_other_slash_commands() {
        assert_eq!(
            parse_client_message("/Nick   Carol\n").unwrap(),
            ClientCommand::Command {
                name: "nick".to_string(),
                args: "Carol".to_string(),
            }
        );
    }
}
