//! Display names and the rules used to negotiate them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DomainError, DomainResult};

/// Names no client may claim, compared case-insensitively.
pub const RESERVED_NAMES: &[&str] = &["SERVER", "SYSTEM"];

/// A client's display name.
///
/// Uniqueness is not a property of the value itself; the registry enforces
/// it when a name is inserted or renamed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    /// Creates a display name without validation.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Generated name for clients whose requested name was unusable.
    pub fn fallback_for_port(remote_port: u16) -> Self {
        Self(format!("User{remote_port}"))
    }

    /// Returns true if `name` matches a reserved name, ignoring case.
    #[must_use]
    pub fn is_reserved(name: &str) -> bool {
        let upper = name.to_uppercase();
        RESERVED_NAMES.iter().any(|reserved| upper == *reserved)
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends `_1`, `_2`, ... until `is_taken` rejects the candidate.
    ///
    /// Returns `self` unchanged when the name is free.
    #[must_use]
    pub fn deduplicate<F>(self, is_taken: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        if !is_taken(&self.0) {
            return self;
        }

        let mut count: u64 = 1;
        loop {
            let candidate = format!("{}_{count}", self.0);
            if !is_taken(&candidate) {
                return Self(candidate);
            }
            count = count.saturating_add(1);
        }
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DisplayName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DisplayName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for DisplayName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for DisplayName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Outcome of the first negotiation step: the name a connection asked for
/// after trimming, and the name it will try to register with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRequest {
    /// Trimmed name as sent by the client (`None` if it was not valid text)
    pub requested: Option<String>,

    /// Name to register, before duplicate resolution
    pub name: DisplayName,

    /// True when the requested name was empty, undecodable or reserved
    pub replaced: bool,
}

impl NameRequest {
    /// Builds a request from the handshake payload.
    ///
    /// Empty, undecodable (`None`) and reserved names are replaced by
    /// `User<remote_port>`.
    pub fn from_handshake(raw: Option<&str>, remote_port: u16) -> Self {
        let requested = raw.map(|s| s.trim().to_string());

        match requested.as_deref() {
            Some(name) if !name.is_empty() && !DisplayName::is_reserved(name) => Self {
                name: DisplayName::new(name),
                requested,
                replaced: false,
            },
            _ => Self {
                name: DisplayName::fallback_for_port(remote_port),
                requested,
                replaced: true,
            },
        }
    }

    /// Validates a name requested through a rename.
    ///
    /// Unlike the handshake, a rename never falls back to a generated name.
    pub fn for_rename(raw: &str) -> DomainResult<DisplayName> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(DomainError::InvalidName {
                name: name.to_string(),
                reason: "name is empty".to_string(),
            });
        }
        if DisplayName::is_reserved(name) {
            return Err(DomainError::InvalidName {
                name: name.to_string(),
                reason: "name is reserved".to_string(),
            });
        }
        Ok(DisplayName::new(name))
    }
}
