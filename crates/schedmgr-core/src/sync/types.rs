//! Core types for external calendar synchronization.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, ValidationError};

/// Counts produced by a merge of external events into the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl fmt::Display for MergeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted",
            self.created, self.updated, self.deleted
        )
    }
}

/// Counts reported by the external calendar for a push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorCounts {
    #[serde(default)]
    pub created: usize,
    #[serde(default)]
    pub updated: usize,
    #[serde(default)]
    pub deleted: usize,
    #[serde(default)]
    pub skipped: usize,
}

impl fmt::Display for MirrorCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} skipped",
            self.created, self.updated, self.deleted, self.skipped
        )
    }
}

/// Outcome of one pull-then-push round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub pulled: MergeSummary,
    pub pushed: MirrorCounts,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pull: {}; push: {}", self.pulled, self.pushed)
    }
}

/// Current sync status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Last successful pull-then-push round.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Counts from that round.
    pub last_report: Option<SyncReport>,
    /// Whether a sync is currently in progress.
    pub in_progress: bool,
}

/// Broad failure category, used to decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Endpoint unset or store unavailable.
    Configuration,
    /// Network failure, non-2xx or unparseable response.
    Transport,
    /// Malformed payload or invalid dates.
    Data,
    /// A store or the external calendar refused a write.
    Write,
    /// Another sync round is still running.
    Busy,
}

/// Sync error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("External calendar endpoint is not configured")]
    NotConfigured,

    #[error("Invalid external calendar endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("A sync is already in progress")]
    InFlight,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("External calendar returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Malformed response from external calendar: {0}")]
    MalformedResponse(String),

    #[error("External calendar rejected the request: {0}")]
    Rejected(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::NotConfigured | SyncError::InvalidEndpoint(_) => ErrorKind::Configuration,
            SyncError::Store(StoreError::Unavailable) => ErrorKind::Configuration,
            SyncError::InFlight => ErrorKind::Busy,
            SyncError::Network(_)
            | SyncError::HttpStatus { .. }
            | SyncError::MalformedResponse(_) => ErrorKind::Transport,
            SyncError::Validation(_) | SyncError::Serialization(_) => ErrorKind::Data,
            SyncError::Rejected(_) | SyncError::Store(_) => ErrorKind::Write,
        }
    }

    /// Short message suitable for showing on an explicit user action.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Configuration => format!("Sync is not set up: {self}"),
            ErrorKind::Transport => format!("Could not reach the external calendar: {self}"),
            ErrorKind::Data => format!("Invalid data: {self}"),
            ErrorKind::Write => format!("Write failed: {self}"),
            ErrorKind::Busy => "Sync already running, try again shortly".to_string(),
        }
    }
}
