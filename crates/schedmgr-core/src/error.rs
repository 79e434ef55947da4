//! Core error types for schedmgr-core.
//!
//! This module defines the error hierarchy using thiserror. Each concern
//! (local store, configuration, validation) has its own enum; sync failures
//! live in [`crate::sync::SyncError`] and wrap the store and validation
//! errors.

use std::path::PathBuf;
use thiserror::Error;

/// Local event store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store is not connected
    #[error("Local store is not connected")]
    Unavailable,

    /// Failed to open the database file
    #[error("Failed to open event store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Event store migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked or the connection mutex is poisoned
    #[error("Event store is locked")]
    Locked,

    /// The backend refused the write
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// A stored record could not be encoded or decoded
    #[error("Record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be determined or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Title missing after trimming
    #[error("Title is required")]
    TitleRequired,

    /// Title over the length bound
    #[error("Title is {len} characters long (max {max})")]
    TitleTooLong { len: usize, max: usize },

    /// Description over the length bound
    #[error("Description is {len} characters long (max {max})")]
    DescriptionTooLong { len: usize, max: usize },

    /// Invalid time range
    #[error("Invalid time range: end ({end}) must be after start ({start})")]
    InvalidTimeRange { start: String, end: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Import payload could not be understood
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}
