//! Local store / external calendar synchronization layer.
//!
//! Keeps the local event store and an external calendar converging: local
//! writes are mirrored out as they happen, external events are pulled and
//! merged in, and duplicate copies of the same event are collapsed.

pub mod backref;
pub mod client_id;
pub mod dedup;
pub mod engine;
pub mod feed;
pub mod merge;
pub mod mirror;
pub mod mutator;
pub mod normalize;
pub mod range;
pub mod report;
pub mod scheduler;
pub mod transfer;
pub mod types;

#[cfg(test)]
mod merge_tests;
#[cfg(test)]
mod scheduler_tests;
#[cfg(test)]
pub(crate) mod test_support;

pub use client_id::{ClientId, ClientIdError};
pub use dedup::{build_group_key, dedupe_store, normalize_title, plan_dedup, GroupMember};
pub use engine::SyncEngine;
pub use feed::{run_dispatcher, Applied, EventCache};
pub use merge::merge_external_events;
pub use mirror::{
    DeleteTarget, ExternalCalendar, ExternalEvent, MirrorBatch, MirrorClient, UpsertItem,
};
pub use mutator::{EventMutator, MirrorPolicy, Propagation};
pub use normalize::{format_date_only, normalize_date_time_string};
pub use range::AllowedRange;
pub use report::{report, Reporter, TracingReporter};
pub use scheduler::{AutoSync, SyncSchedule};
pub use transfer::{export_events, import_events, ExportEnvelope};
pub use types::{ErrorKind, MergeSummary, MirrorCounts, SyncError, SyncReport, SyncStatus};
