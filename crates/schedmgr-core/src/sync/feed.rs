//! Working-set cache fed by the local store's change feed.
//!
//! Notifications arrive at least once. One whose `(updatedAt,
//! lastWriteClientId)` matches the held copy is this session's own write
//! coming back and is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::event::Event;
use crate::storage::{ChangeFeed, ChangeKind, ChangeNotification, EventStore};
use crate::sync::range::AllowedRange;

/// What [`EventCache::apply`] did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    Ignored,
}

/// In-memory working set of events, keyed by id.
#[derive(Debug, Default)]
pub struct EventCache {
    events: HashMap<String, Event>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents with a full read of `store`.
    pub async fn load(&mut self, store: &dyn EventStore) -> Result<usize, StoreError> {
        let events = store.fetch_all().await?;
        self.events = events
            .into_iter()
            .filter(|e| !e.id.is_empty())
            .map(|e| (e.id.clone(), e))
            .collect();
        debug!(count = self.events.len(), "event cache loaded");
        Ok(self.events.len())
    }

    pub fn apply(&mut self, notification: ChangeNotification) -> Applied {
        let ChangeNotification { kind, id, record } = notification;
        match kind {
            ChangeKind::Removed => match self.events.remove(&id) {
                Some(_) => Applied::Removed,
                None => Applied::Ignored,
            },
            ChangeKind::Added | ChangeKind::Changed => match self.events.get(&id) {
                Some(held) if held.fingerprint() == record.fingerprint() => {
                    debug!(%id, "notification matches held copy");
                    Applied::Ignored
                }
                Some(_) => {
                    self.events.insert(id, record);
                    Applied::Replaced
                }
                None => {
                    self.events.insert(id, record);
                    Applied::Inserted
                }
            },
        }
    }

    /// Hold `event` as written by this session.
    pub fn record(&mut self, event: Event) {
        if !event.id.is_empty() {
            self.events.insert(event.id.clone(), event);
        }
    }

    pub fn forget(&mut self, id: &str) {
        self.events.remove(id);
    }

    pub fn get(&self, id: &str) -> Option<&Event> {
        self.events.get(id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// In-range events sorted by start time, then title.
    pub fn visible(&self, range: &AllowedRange) -> Vec<&Event> {
        let mut visible: Vec<&Event> = self.events.values().filter(|e| range.contains(e)).collect();
        visible.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.id.cmp(&b.id))
        });
        visible
    }

    /// Every held event sorted by start time.
    pub fn all(&self) -> Vec<&Event> {
        let mut all: Vec<&Event> = self.events.values().collect();
        all.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
        all
    }
}

/// Apply notifications from `feed` to `cache` until the store goes away.
pub async fn run_dispatcher(mut feed: ChangeFeed, cache: Arc<Mutex<EventCache>>) {
    while let Some(notification) = feed.next().await {
        let id = notification.id.clone();
        let outcome = cache.lock().await.apply(notification);
        debug!(%id, ?outcome, "change applied");
    }
    info!("change feed closed");
}
