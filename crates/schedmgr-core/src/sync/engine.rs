//! User-level sync operations.
//!
//! Every method returns a plain `Result`. Explicit actions wrap the call in
//! [`crate::sync::report`]; the scheduler calls the same methods and keeps
//! the errors to itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::event::{Event, EventDraft, EventPatch};
use crate::storage::EventStore;
use crate::sync::client_id::ClientId;
use crate::sync::dedup::dedupe_store;
use crate::sync::feed::EventCache;
use crate::sync::merge::merge_external_events;
use crate::sync::mirror::ExternalCalendar;
use crate::sync::mutator::{EventMutator, Propagation};
use crate::sync::range::AllowedRange;
use crate::sync::transfer::{export_events, import_events, ExportEnvelope};
use crate::sync::types::{MergeSummary, MirrorCounts, SyncError, SyncReport, SyncStatus};

/// Clears the in-flight flag when the round ends, however it ends.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct SyncEngine {
    mutator: EventMutator,
    in_flight: Arc<AtomicBool>,
    status: Mutex<SyncStatus>,
}

impl SyncEngine {
    /// Engine with a fresh session client id.
    pub fn new(
        store: Arc<dyn EventStore>,
        mirror: Option<Arc<dyn ExternalCalendar>>,
        tz: Tz,
    ) -> Self {
        Self::with_client_id(store, mirror, tz, ClientId::generate())
    }

    pub fn with_client_id(
        store: Arc<dyn EventStore>,
        mirror: Option<Arc<dyn ExternalCalendar>>,
        tz: Tz,
        client_id: ClientId,
    ) -> Self {
        Self {
            mutator: EventMutator::new(store, mirror, client_id, tz),
            in_flight: Arc::new(AtomicBool::new(false)),
            status: Mutex::new(SyncStatus::default()),
        }
    }

    /// Record this session's writes in `cache` so the dispatcher drops
    /// their echoes.
    pub fn with_cache(mut self, cache: Arc<tokio::sync::Mutex<EventCache>>) -> Self {
        self.mutator = self.mutator.with_cache(cache);
        self
    }

    pub fn mutator(&self) -> &EventMutator {
        &self.mutator
    }

    pub fn client_id(&self) -> &ClientId {
        self.mutator.client_id()
    }

    pub fn tz(&self) -> Tz {
        self.mutator.tz()
    }

    /// Whether an external calendar is wired in.
    pub fn is_configured(&self) -> bool {
        self.mutator.mirror().is_some()
    }

    pub fn store_connected(&self) -> bool {
        self.mutator.store().is_connected()
    }

    /// Allowed range as of now.
    pub fn range(&self) -> AllowedRange {
        AllowedRange::current(self.tz())
    }

    pub fn status(&self) -> SyncStatus {
        let mut status = self.status.lock().map(|s| s.clone()).unwrap_or_default();
        status.in_progress = self.in_flight.load(Ordering::Acquire);
        status
    }

    fn mirror(&self) -> Result<&Arc<dyn ExternalCalendar>, SyncError> {
        self.mutator.mirror().ok_or(SyncError::NotConfigured)
    }

    fn require_store(&self) -> Result<(), SyncError> {
        if self.store_connected() {
            Ok(())
        } else {
            Err(StoreError::Unavailable.into())
        }
    }

    /// Validate and add a user-entered event, mirroring it strictly.
    pub async fn create_event(&self, draft: EventDraft) -> Result<String, SyncError> {
        draft.clone().into_event(self.tz()).validate()?;
        self.mutator.add_event(draft, Propagation::Mirror).await
    }

    pub async fn update_event(&self, id: &str, patch: EventPatch) -> Result<bool, SyncError> {
        self.mutator.update_event(id, patch, Propagation::Mirror).await
    }

    pub async fn delete_event(&self, id: &str) -> Result<bool, SyncError> {
        self.mutator.delete_event(id, Propagation::Mirror).await
    }

    /// Current working set. In-range events only unless `include_all`.
    pub async fn list_events(&self, include_all: bool) -> Result<Vec<Event>, SyncError> {
        let mut cache = EventCache::new();
        cache.load(self.mutator.store().as_ref()).await?;
        let events = if include_all {
            cache.all()
        } else {
            cache.visible(&self.range())
        };
        Ok(events.into_iter().cloned().collect())
    }

    /// Pull external events and merge them into the local store.
    pub async fn pull(&self) -> Result<MergeSummary, SyncError> {
        let mirror = self.mirror()?;
        self.require_store()?;

        let range = self.range();
        let external = mirror.pull_events(&range).await?;
        merge_external_events(&self.mutator, &external, &range).await
    }

    /// Push every eligible local event to the external calendar.
    pub async fn push(&self) -> Result<MirrorCounts, SyncError> {
        let mirror = self.mirror()?;
        self.require_store()?;

        let range = self.range();
        let events = self.mutator.store().fetch_starting_by(&range.latest_start()).await?;
        mirror.push_full_sync(&events, &range).await
    }

    /// Pull then push. Fails with [`SyncError::InFlight`] while another
    /// round is running.
    pub async fn sync_once(&self) -> Result<SyncReport, SyncError> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(SyncError::InFlight)?;

        let pulled = self.pull().await?;
        let pushed = self.push().await?;
        let report = SyncReport { pulled, pushed };

        if let Ok(mut status) = self.status.lock() {
            status.last_sync_at = Some(Utc::now());
            status.last_report = Some(report);
        }
        info!(%report, "sync round complete");
        Ok(report)
    }

    /// Standalone dedup pass over the local store.
    pub async fn dedupe(&self) -> Result<usize, SyncError> {
        self.require_store()?;
        let removed = dedupe_store(&self.mutator, &self.range()).await?;
        info!(removed, "dedup pass complete");
        Ok(removed)
    }

    /// Remove every tagged event from the external calendar.
    pub async fn clear_external(&self) -> Result<usize, SyncError> {
        self.mirror()?.clear().await
    }

    /// Import an exported document. The whole payload is validated before
    /// anything is written. If an insert fails, the records already
    /// imported are deleted again and the error is returned.
    pub async fn import(&self, json: &str) -> Result<usize, SyncError> {
        self.require_store()?;
        let drafts = import_events(json, self.tz())?;

        let mut imported = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match self.mutator.add_event(draft, Propagation::Mirror).await {
                Ok(id) => {
                    debug!(%id, "imported event");
                    imported.push(id);
                }
                Err(err) => {
                    warn!(done = imported.len(), error = %err, "import failed, rolling back");
                    self.roll_back_import(&imported).await;
                    return Err(err);
                }
            }
        }
        info!(imported = imported.len(), "import complete");
        Ok(imported.len())
    }

    async fn roll_back_import(&self, ids: &[String]) {
        for id in ids {
            if let Err(err) = self.mutator.delete_event(id, Propagation::Mirror).await {
                warn!(%id, error = %err, "failed to roll back imported event");
            }
        }
    }

    pub async fn export(&self) -> Result<ExportEnvelope<Event>, SyncError> {
        let events = self.mutator.store().fetch_all().await?;
        Ok(export_events(&events))
    }
}
