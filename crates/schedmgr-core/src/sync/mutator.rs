//! Local store mutations with optional mirroring to the external calendar.
//!
//! Inserts and updates/deletes mirror under different policies:
//!
//! | Mutation | Policy                       | Mirror failure                       |
//! |----------|------------------------------|--------------------------------------|
//! | insert   | [`MirrorPolicy::Strict`]     | local record removed, error returned |
//! | update   | [`MirrorPolicy::BestEffort`] | logged, local write kept             |
//! | delete   | [`MirrorPolicy::BestEffort`] | logged, local delete kept            |
//!
//! Timetable events never reach the external calendar. With a cache
//! attached, each successful local write is recorded there before the call
//! returns, so its change notification comes back as a match.

use std::sync::Arc;

use chrono::Utc;
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::event::{Event, EventDraft, EventPatch};
use crate::storage::EventStore;
use crate::sync::client_id::ClientId;
use crate::sync::feed::EventCache;
use crate::sync::mirror::{DeleteTarget, ExternalCalendar, MirrorBatch};
use crate::sync::types::SyncError;

/// Whether a mutation is forwarded to the external calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Mirror per the mutation's [`MirrorPolicy`].
    Mirror,
    /// Local write only. Used for writes that came from the external side.
    LocalOnly,
}

/// How a mirror failure affects the local write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorPolicy {
    /// Local and external writes succeed or fail together.
    Strict,
    /// The local write stands; the scheduler reconciles later.
    BestEffort,
}

impl MirrorPolicy {
    pub const fn for_insert() -> Self {
        MirrorPolicy::Strict
    }

    pub const fn for_update() -> Self {
        MirrorPolicy::BestEffort
    }

    pub const fn for_delete() -> Self {
        MirrorPolicy::BestEffort
    }
}

/// Add/update/delete against an [`EventStore`].
pub struct EventMutator {
    store: Arc<dyn EventStore>,
    mirror: Option<Arc<dyn ExternalCalendar>>,
    client_id: ClientId,
    tz: Tz,
    cache: Option<Arc<Mutex<EventCache>>>,
}

impl EventMutator {
    pub fn new(
        store: Arc<dyn EventStore>,
        mirror: Option<Arc<dyn ExternalCalendar>>,
        client_id: ClientId,
        tz: Tz,
    ) -> Self {
        Self {
            store,
            mirror,
            client_id,
            tz,
            cache: None,
        }
    }

    /// Record this session's writes in `cache`.
    pub fn with_cache(mut self, cache: Arc<Mutex<EventCache>>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn remember(&self, event: &Event) {
        if let Some(cache) = &self.cache {
            cache.lock().await.record(event.clone());
        }
    }

    async fn forget(&self, id: &str) {
        if let Some(cache) = &self.cache {
            cache.lock().await.forget(id);
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn mirror(&self) -> Option<&Arc<dyn ExternalCalendar>> {
        self.mirror.as_ref()
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    fn mirror_target(&self, propagation: Propagation, event: &Event) -> Option<&Arc<dyn ExternalCalendar>> {
        if propagation == Propagation::LocalOnly || event.is_timetable {
            return None;
        }
        if self.mirror.is_none() {
            debug!(id = %event.id, "no external calendar configured, skipping mirror");
        }
        self.mirror.as_ref()
    }

    fn stamp(&self, event: &mut Event) {
        let now = Utc::now();
        event.updated_at = Some(now);
        event.last_write_client_id = Some(self.client_id.to_string());
    }

    /// Write a new record and return its id.
    ///
    /// With [`Propagation::Mirror`] a non-timetable event is mirrored
    /// strictly: if the external insert fails the local record is removed
    /// again and the mirror error is returned.
    ///
    /// # Errors
    /// Store unavailable or rejecting the write, or the mirror failing.
    pub async fn add_event(&self, draft: EventDraft, propagation: Propagation) -> Result<String, SyncError> {
        if !self.store.is_connected() {
            return Err(StoreError::Unavailable.into());
        }

        let mut event = draft.into_event(self.tz);
        self.stamp(&mut event);
        event.created_at = event.updated_at;

        let id = self.store.push(event.clone()).await?;
        event.id = id.clone();
        self.remember(&event).await;
        debug!(%id, title = %event.title, "event added");

        if let Some(mirror) = self.mirror_target(propagation, &event) {
            if let Err(err) = mirror.mirror_mutations(MirrorBatch::upsert(event)).await {
                warn!(%id, error = %err, policy = ?MirrorPolicy::for_insert(), "mirror failed, rolling back insert");
                match self.store.remove(&id).await {
                    Ok(_) => self.forget(&id).await,
                    Err(rollback) => warn!(%id, error = %rollback, "rollback of unmirrored insert failed"),
                }
                return Err(err);
            }
        }

        Ok(id)
    }

    /// Apply `patch` to the record with `id`. Returns `Ok(false)` when there
    /// is no such record. Mirror failures are logged and swallowed.
    ///
    /// # Errors
    /// The local read or write failed.
    pub async fn update_event(
        &self,
        id: &str,
        patch: EventPatch,
        propagation: Propagation,
    ) -> Result<bool, SyncError> {
        let Some(existing) = self.store.get(id).await? else {
            debug!(%id, "update skipped, no such event");
            return Ok(false);
        };

        let mut merged = patch.apply_to(&existing, self.tz);
        merged.id = existing.id.clone();
        merged.created_at = existing.created_at;
        self.stamp(&mut merged);

        self.store.set(&merged).await?;
        self.remember(&merged).await;
        debug!(%id, "event updated");

        if let Some(mirror) = self.mirror_target(propagation, &merged) {
            if let Err(err) = mirror.mirror_mutations(MirrorBatch::upsert(merged)).await {
                warn!(%id, error = %err, policy = ?MirrorPolicy::for_update(), "mirror of update failed");
            }
        }

        Ok(true)
    }

    /// Remove the record with `id`. Returns `Ok(false)` when there was
    /// nothing to remove. The mirror receives the prior snapshot; its
    /// failures are logged and swallowed.
    ///
    /// # Errors
    /// The local read or delete failed.
    pub async fn delete_event(&self, id: &str, propagation: Propagation) -> Result<bool, SyncError> {
        let Some(prior) = self.store.get(id).await? else {
            debug!(%id, "delete skipped, no such event");
            return Ok(false);
        };

        self.store.remove(id).await?;
        self.forget(id).await;
        debug!(%id, "event deleted");

        if let Some(mirror) = self.mirror_target(propagation, &prior) {
            let batch = MirrorBatch::delete(DeleteTarget::Snapshot(prior));
            if let Err(err) = mirror.mirror_mutations(batch).await {
                warn!(%id, error = %err, policy = ?MirrorPolicy::for_delete(), "mirror of delete failed");
            }
        }

        Ok(true)
    }
}
