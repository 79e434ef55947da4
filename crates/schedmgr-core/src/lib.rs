//! # schedmgr Core Library
//!
//! Core logic for a calendar that keeps its events in a realtime local store
//! and mirrors them to an external calendar service. The CLI is a thin layer
//! over the same library.
//!
//! ## Architecture
//!
//! - **Event model**: the canonical [`Event`] record and its validation bounds
//! - **Storage**: the [`EventStore`] seam with an in-memory and a SQLite
//!   backend, plus TOML-based configuration
//! - **Sync**: normalization, the allowed retention range, duplicate
//!   matching, the local store mutator, the external mirror client, the merge
//!   orchestrator, the change feed dispatcher and the automatic scheduler
//!
//! ## Key Components
//!
//! - [`SyncEngine`]: user-level pull/push/dedupe operations
//! - [`AutoSync`]: periodic silent pull-then-push loop
//! - [`EventMutator`]: add/update/delete with mirror policies
//! - [`Config`]: application configuration management

pub mod error;
pub mod event;
pub mod storage;
pub mod sync;

pub use error::{ConfigError, StoreError, ValidationError};
pub use event::{Event, EventDraft, EventPatch, EventSource, Recurrence};
pub use storage::{
    ChangeFeed, ChangeKind, ChangeNotification, Config, EventStore, MemoryStore, SqliteStore,
};
pub use sync::{
    AllowedRange, AutoSync, EventCache, EventMutator, ExternalCalendar, MergeSummary,
    MirrorClient, MirrorPolicy, Propagation, SyncEngine, SyncError,
};
