//! Local event store seam and its change feed.

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::StoreError;
use crate::event::Event;

/// Capacity of each backend's change broadcast.
pub(crate) const FEED_CAPACITY: usize = 256;

/// Kind of change a store reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// One change-feed entry. For removals `record` is the last stored copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
    pub id: String,
    pub record: Event,
}

impl ChangeNotification {
    pub fn added(record: Event) -> Self {
        Self {
            kind: ChangeKind::Added,
            id: record.id.clone(),
            record,
        }
    }

    pub fn changed(record: Event) -> Self {
        Self {
            kind: ChangeKind::Changed,
            id: record.id.clone(),
            record,
        }
    }

    pub fn removed(record: Event) -> Self {
        Self {
            kind: ChangeKind::Removed,
            id: record.id.clone(),
            record,
        }
    }
}

/// Subscription to a store's added/changed/removed notifications.
/// Dropping it unsubscribes.
pub struct ChangeFeed {
    rx: broadcast::Receiver<ChangeNotification>,
}

impl ChangeFeed {
    pub(crate) fn new(rx: broadcast::Receiver<ChangeNotification>) -> Self {
        Self { rx }
    }

    /// Next notification, or `None` once the store is gone. Notifications
    /// lost to a slow consumer are logged and skipped.
    pub async fn next(&mut self) -> Option<ChangeNotification> {
        loop {
            match self.rx.recv().await {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`ChangeFeed::next`].
    pub fn try_next(&mut self) -> Option<ChangeNotification> {
        loop {
            match self.rx.try_recv() {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "change feed lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

/// Realtime key-value store holding events by id.
///
/// `push` is the only way to create a record; the store picks the id.
/// `remove` on a missing id is not an error.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Whether the backing store is currently reachable.
    fn is_connected(&self) -> bool;

    /// Every record, in insertion order.
    async fn fetch_all(&self) -> Result<Vec<Event>, StoreError>;

    /// Records whose stored start sorts at or before `latest_start`, plus
    /// records with no start, in insertion order.
    async fn fetch_starting_by(&self, latest_start: &str) -> Result<Vec<Event>, StoreError> {
        let mut events = self.fetch_all().await?;
        events.retain(|e| e.start_time.is_empty() || e.start_time.as_str() <= latest_start);
        Ok(events)
    }

    async fn get(&self, id: &str) -> Result<Option<Event>, StoreError>;

    /// Insert a new record and return its generated id. Any id on `event`
    /// is ignored.
    async fn push(&self, event: Event) -> Result<String, StoreError>;

    /// Write `event` under `event.id`, replacing any existing record.
    async fn set(&self, event: &Event) -> Result<(), StoreError>;

    async fn remove(&self, id: &str) -> Result<(), StoreError>;

    /// Subscribe to added/changed/removed notifications.
    fn subscribe(&self) -> ChangeFeed;
}
