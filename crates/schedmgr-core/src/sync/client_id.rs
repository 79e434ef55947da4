// Per-session writer identity stamped on every local write
// Format: "session-<uuid>"

use std::fmt;
use uuid::Uuid;

const CLIENT_ID_PREFIX: &str = "session-";

/// Error type for client ID parsing
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClientIdError {
    #[error("Invalid client ID format: {0}")]
    InvalidFormat(String),
}

/// Random identifier for one running session. Written to
/// `lastWriteClientId` so the change feed can recognize its own writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Fresh id in format "session-<uuid>".
    pub fn generate() -> Self {
        Self(format!("{}{}", CLIENT_ID_PREFIX, Uuid::new_v4()))
    }

    /// Accept a previously generated id.
    pub fn parse(value: &str) -> Result<Self, ClientIdError> {
        let value = value.trim();
        match value.strip_prefix(CLIENT_ID_PREFIX) {
            Some(rest) if Uuid::parse_str(rest).is_ok() => Ok(Self(value.to_string())),
            _ => Err(ClientIdError::InvalidFormat(value.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
