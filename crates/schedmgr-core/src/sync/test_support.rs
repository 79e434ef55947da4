//! Shared fixtures for the sync tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::Notify;

use crate::event::{Event, EventDraft, EventSource};
use crate::storage::{EventStore, MemoryStore};
use crate::sync::client_id::ClientId;
use crate::sync::mirror::{ExternalCalendar, ExternalEvent, MirrorBatch};
use crate::sync::mutator::EventMutator;
use crate::sync::range::AllowedRange;
use crate::sync::types::{MirrorCounts, SyncError};

/// Range anchored on 2025-06-15 so fixtures dated June 2025 are inside it.
pub fn june_range() -> AllowedRange {
    AllowedRange::at(
        NaiveDate::from_ymd_opt(2025, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
    )
}

pub fn at_hour(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
}

pub fn local_event(id: &str, title: &str, start: &str, end: &str) -> Event {
    let mut event = EventDraft::new(title, start, end).into_event(Tz::UTC);
    event.id = id.to_string();
    event.updated_at = Some(at_hour(8));
    event
}

pub fn google_event(id: &str, title: &str, start: &str, end: &str, gid: &str) -> Event {
    Event {
        source: EventSource::Google,
        is_google_imported: true,
        google_event_id: Some(gid.to_string()),
        ..local_event(id, title, start, end)
    }
}

pub fn external(gid: &str, title: &str, start: &str, end: &str) -> ExternalEvent {
    ExternalEvent {
        google_event_id: Some(gid.to_string()),
        title: Some(title.to_string()),
        start_date_time: Some(start.to_string()),
        end_date_time: Some(end.to_string()),
        all_day: Some(false),
        ..Default::default()
    }
}

pub fn mutator(store: &Arc<MemoryStore>, mirror: Option<Arc<FakeCalendar>>) -> EventMutator {
    let store: Arc<dyn EventStore> = store.clone();
    let mirror = mirror.map(|m| m as Arc<dyn ExternalCalendar>);
    EventMutator::new(store, mirror, ClientId::generate(), Tz::UTC)
}

/// In-process external calendar that records what it is sent.
#[derive(Default)]
pub struct FakeCalendar {
    pub batches: Mutex<Vec<MirrorBatch>>,
    pub remote: Mutex<Vec<ExternalEvent>>,
    pub fail_mutations: AtomicBool,
    pub fail_pull: AtomicBool,
    /// Upsert batches beyond this many fail.
    pub upsert_limit: Mutex<Option<usize>>,
    pub pull_calls: AtomicUsize,
    pub push_calls: AtomicUsize,
    pub pushed_events: AtomicUsize,
    /// When set, each pull waits for one notification before returning.
    pub gate: Option<Arc<Notify>>,
}

impl FakeCalendar {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        let fake = Self::default();
        fake.fail_mutations.store(true, Ordering::SeqCst);
        Arc::new(fake)
    }

    /// Accepts the first `limit` upsert batches, then fails.
    pub fn accepting(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            upsert_limit: Mutex::new(Some(limit)),
            ..Default::default()
        })
    }

    pub fn with_remote(events: Vec<ExternalEvent>) -> Arc<Self> {
        Arc::new(Self {
            remote: Mutex::new(events),
            ..Default::default()
        })
    }

    pub fn batches(&self) -> Vec<MirrorBatch> {
        self.batches.lock().unwrap().clone()
    }

    pub fn pulls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalCalendar for FakeCalendar {
    async fn mirror_mutations(&self, batch: MirrorBatch) -> Result<MirrorCounts, SyncError> {
        let upserts_sent = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(batch.clone());
            batches.iter().filter(|b| !b.upserts.is_empty()).count()
        };
        let over_limit = matches!(*self.upsert_limit.lock().unwrap(), Some(limit) if upserts_sent > limit);
        if self.fail_mutations.load(Ordering::SeqCst) || over_limit {
            return Err(SyncError::HttpStatus {
                status: 500,
                body: "boom".into(),
            });
        }
        Ok(MirrorCounts {
            created: batch.upserts.len(),
            deleted: batch.deletes.len(),
            ..Default::default()
        })
    }

    async fn pull_events(&self, _range: &AllowedRange) -> Result<Vec<ExternalEvent>, SyncError> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(SyncError::MalformedResponse("bad json".into()));
        }
        Ok(self.remote.lock().unwrap().clone())
    }

    async fn push_full_sync(
        &self,
        events: &[Event],
        range: &AllowedRange,
    ) -> Result<MirrorCounts, SyncError> {
        self.push_calls.fetch_add(1, Ordering::SeqCst);
        let sent = crate::sync::mirror::full_sync_candidates(events, range).len();
        self.pushed_events.store(sent, Ordering::SeqCst);
        Ok(MirrorCounts {
            created: sent,
            ..Default::default()
        })
    }

    async fn clear(&self) -> Result<usize, SyncError> {
        Ok(self.remote.lock().unwrap().drain(..).count())
    }
}
