//! Pluggable text assistant used by the AI chat commands.
//!
//! The relay does not ship a model client. Embedders provide an
//! implementation of [`TextAssistant`]; without one, the AI commands reply
//! that the feature is unavailable.

use async_trait::async_trait;
use thiserror::Error;

/// History lines passed as context to [`TextAssistant::transform`].
pub const TRANSFORM_CONTEXT_LINES: usize = 10;

/// History lines passed to [`TextAssistant::summarize`].
pub const SUMMARY_HISTORY_LINES: usize = 30;

/// String-in, string-out text capability.
///
/// Calls may take seconds; the router runs them on background tasks so a
/// slow call never blocks the requesting session's read loop.
#[async_trait]
pub trait TextAssistant: Send + Sync {
    /// Rewrites `text` in a positive tone, using recent chat lines as context.
    async fn transform(&self, text: &str, context: &[String]) -> Result<String, AssistantError>;

    /// Summarizes the given chat lines.
    async fn summarize(&self, history: &[String]) -> Result<String, AssistantError>;

    /// Answers a free-form question.
    async fn ask(&self, _question: &str) -> Result<String, AssistantError> {
        Err(AssistantError::Unavailable(
            "questions are not supported".to_string(),
        ))
    }
}

/// Failure of an assistant call. Reported to the requester only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssistantError {
    #[error("assistant is unavailable: {0}")]
    Unavailable(String),

    #[error("assistant request failed: {0}")]
    Request(String),

    #[error("assistant returned an empty response")]
    EmptyResponse,
}
