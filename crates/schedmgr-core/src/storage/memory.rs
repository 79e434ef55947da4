//! In-process event store.
//!
//! Used for ephemeral sessions and tests. Keeps an operation journal and can
//! be told to reject writes or report itself disconnected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::store::{ChangeFeed, ChangeNotification, EventStore, FEED_CAPACITY};
use crate::error::StoreError;
use crate::event::Event;

/// Journal entry for a write that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Push(String),
    Set(String),
    Remove(String),
}

pub struct MemoryStore {
    records: Mutex<Vec<Event>>,
    journal: Mutex<Vec<StoreOp>>,
    feed: broadcast::Sender<ChangeNotification>,
    connected: AtomicBool,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            records: Mutex::new(Vec::new()),
            journal: Mutex::new(Vec::new()),
            feed,
            connected: AtomicBool::new(true),
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Store pre-populated with records that keep their ids.
    pub fn with_events(events: impl IntoIterator<Item = Event>) -> Self {
        let store = Self::new();
        if let Ok(mut records) = store.records.lock() {
            records.extend(events);
        }
        store
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make every subsequent write fail with [`StoreError::Rejected`].
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Writes performed so far, oldest first.
    pub fn journal(&self) -> Vec<StoreOp> {
        self.journal.lock().map(|j| j.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("writes disabled".into()));
        }
        Ok(())
    }

    fn check_readable(&self) -> Result<(), StoreError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    fn record(&self, op: StoreOp) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(op);
        }
    }

    fn notify(&self, notification: ChangeNotification) {
        // No subscribers is fine.
        let _ = self.feed.send(notification);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn fetch_all(&self) -> Result<Vec<Event>, StoreError> {
        self.check_readable()?;
        let records = self.records.lock().map_err(|_| StoreError::Locked)?;
        Ok(records.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Event>, StoreError> {
        self.check_readable()?;
        let records = self.records.lock().map_err(|_| StoreError::Locked)?;
        Ok(records.iter().find(|e| e.id == id).cloned())
    }

    async fn push(&self, mut event: Event) -> Result<String, StoreError> {
        self.check_writable()?;
        let id = Uuid::new_v4().simple().to_string();
        event.id = id.clone();
        {
            let mut records = self.records.lock().map_err(|_| StoreError::Locked)?;
            records.push(event.clone());
        }
        self.record(StoreOp::Push(id.clone()));
        self.notify(ChangeNotification::added(event));
        Ok(id)
    }

    async fn set(&self, event: &Event) -> Result<(), StoreError> {
        self.check_writable()?;
        if event.id.is_empty() {
            return Err(StoreError::Rejected("record has no id".into()));
        }
        let existed = {
            let mut records = self.records.lock().map_err(|_| StoreError::Locked)?;
            match records.iter_mut().find(|e| e.id == event.id) {
                Some(slot) => {
                    *slot = event.clone();
                    true
                }
                None => {
                    records.push(event.clone());
                    false
                }
            }
        };
        self.record(StoreOp::Set(event.id.clone()));
        self.notify(if existed {
            ChangeNotification::changed(event.clone())
        } else {
            ChangeNotification::added(event.clone())
        });
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let removed = {
            let mut records = self.records.lock().map_err(|_| StoreError::Locked)?;
            records
                .iter()
                .position(|e| e.id == id)
                .map(|idx| records.remove(idx))
        };
        self.record(StoreOp::Remove(id.to_string()));
        if let Some(record) = removed {
            self.notify(ChangeNotification::removed(record));
        }
        Ok(())
    }

    fn subscribe(&self) -> ChangeFeed {
        ChangeFeed::new(self.feed.subscribe())
    }
}
