//! External calendar mirror client.
//!
//! The external side is a single HTTP endpoint: POST for batched mutations
//! and full syncs, GET with an `action` query for listing and clearing.

use async_trait::async_trait;
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::event::{Event, EventSource};
use crate::sync::backref::{parse_back_reference, strip_back_reference};
use crate::sync::normalize::to_iso8601;
use crate::sync::range::AllowedRange;
use crate::sync::transfer::ExportEnvelope;
use crate::sync::types::{MirrorCounts, SyncError};

/// Default tag used for bulk clears.
pub const DEFAULT_TAG: &str = "schedmgr";

/// Upsert payload for one local event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_date_time: Option<String>,
    pub end_date_time: Option<String>,
    pub all_day: bool,
    pub is_timetable: bool,
    pub reminder_minutes: Option<u32>,
    pub color: String,
}

impl UpsertItem {
    pub fn from_event(event: &Event, tz: Tz) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start_date_time: to_iso8601(&event.start_time, tz),
            end_date_time: to_iso8601(&event.end_time, tz),
            all_day: event.all_day,
            is_timetable: event.is_timetable,
            reminder_minutes: event.reminder_minutes,
            color: event.color.clone(),
        }
    }
}

/// Prior-state snapshot sent with a delete so the external side can match
/// by title and date when its own link is stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSnapshot {
    pub id: String,
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    pub all_day: bool,
}

/// Delete payload: a bare id or a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeleteItem {
    Id(String),
    Snapshot(DeleteSnapshot),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MutationsRequest<'a> {
    action: &'static str,
    upserts: &'a [UpsertItem],
    deletes: &'a [DeleteItem],
}

#[derive(Debug, Deserialize)]
struct MutationsResponse {
    success: Option<bool>,
    error: Option<String>,
    #[serde(flatten)]
    counts: MirrorCounts,
}

#[derive(Debug, Deserialize)]
struct FullSyncResponse {
    success: Option<bool>,
    error: Option<String>,
    #[serde(default)]
    created: usize,
    #[serde(default)]
    updated: usize,
    #[serde(default)]
    skipped: usize,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    success: Option<bool>,
    error: Option<String>,
    #[serde(default)]
    events: Vec<ExternalEvent>,
}

#[derive(Debug, Deserialize)]
struct ClearResponse {
    success: Option<bool>,
    error: Option<String>,
    #[serde(default)]
    deleted: usize,
}

/// One event as listed by the external calendar.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalEvent {
    pub schedule_mgr_id: Option<String>,
    pub google_event_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub all_day: Option<bool>,
    pub start_date_time: Option<String>,
    pub end_date_time: Option<String>,
    pub last_updated: Option<String>,
    pub reminder_minutes: Option<f64>,
}

impl ExternalEvent {
    /// Local id this event was mirrored from: `scheduleMgrId` when present,
    /// otherwise the description marker.
    pub fn back_reference(&self) -> Option<String> {
        non_empty(self.schedule_mgr_id.as_deref())
            .map(str::to_string)
            .or_else(|| self.description.as_deref().and_then(parse_back_reference))
    }

    /// Description with the back-reference marker removed.
    pub fn clean_description(&self) -> String {
        self.description
            .as_deref()
            .map(strip_back_reference)
            .unwrap_or_default()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// What to delete remotely.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    Id(String),
    Snapshot(Event),
}

/// Incremental change set for [`ExternalCalendar::mirror_mutations`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorBatch {
    pub upserts: Vec<Event>,
    pub deletes: Vec<DeleteTarget>,
}

impl MirrorBatch {
    pub fn upsert(event: Event) -> Self {
        Self {
            upserts: vec![event],
            deletes: Vec::new(),
        }
    }

    pub fn delete(target: DeleteTarget) -> Self {
        Self {
            upserts: Vec::new(),
            deletes: vec![target],
        }
    }
}

/// Non-timetable events that carry an id, as transport payloads.
pub fn prepare_upserts(events: &[Event], tz: Tz) -> Vec<UpsertItem> {
    events
        .iter()
        .filter(|e| !e.is_timetable && !e.id.is_empty())
        .map(|e| UpsertItem::from_event(e, tz))
        .collect()
}

/// Delete targets that carry an id.
pub fn prepare_deletes(targets: &[DeleteTarget]) -> Vec<DeleteItem> {
    targets
        .iter()
        .filter_map(|target| match target {
            DeleteTarget::Id(id) => non_empty(Some(id)).map(|id| DeleteItem::Id(id.to_string())),
            DeleteTarget::Snapshot(event) if !event.id.trim().is_empty() => {
                Some(DeleteItem::Snapshot(DeleteSnapshot {
                    id: event.id.clone(),
                    title: event.title.clone(),
                    start_time: event.start_time.clone(),
                    end_time: event.end_time.clone(),
                    all_day: event.all_day,
                }))
            }
            DeleteTarget::Snapshot(_) => None,
        })
        .collect()
}

/// Local events eligible for a full push: locally created, not timetable,
/// with both times, inside the range.
pub fn full_sync_candidates<'a>(events: &'a [Event], range: &AllowedRange) -> Vec<&'a Event> {
    events
        .iter()
        .filter(|e| e.source != EventSource::Google)
        .filter(|e| !e.is_timetable)
        .filter(|e| !e.start_time.is_empty() && !e.end_time.is_empty())
        .filter(|e| range.contains(e))
        .collect()
}

/// External calendar as seen by the sync code.
#[async_trait]
pub trait ExternalCalendar: Send + Sync {
    /// Send one batch of upserts and deletes.
    async fn mirror_mutations(&self, batch: MirrorBatch) -> Result<MirrorCounts, SyncError>;

    /// List external events inside `range`.
    async fn pull_events(&self, range: &AllowedRange) -> Result<Vec<ExternalEvent>, SyncError>;

    /// Push every eligible local event in one request.
    async fn push_full_sync(
        &self,
        events: &[Event],
        range: &AllowedRange,
    ) -> Result<MirrorCounts, SyncError>;

    /// Delete every tagged external event. Returns how many were removed.
    async fn clear(&self) -> Result<usize, SyncError>;
}

/// `reqwest` implementation of [`ExternalCalendar`].
pub struct MirrorClient {
    endpoint: Url,
    tag: String,
    tz: Tz,
    http: reqwest::Client,
}

impl MirrorClient {
    /// # Errors
    /// [`SyncError::InvalidEndpoint`] unless `endpoint` is an http(s) URL.
    pub fn new(endpoint: &str, tag: impl Into<String>, tz: Tz) -> Result<Self, SyncError> {
        let endpoint = parse_endpoint(endpoint)?;
        Ok(Self {
            endpoint,
            tag: tag.into(),
            tz,
            http: reqwest::Client::new(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Parse and check an endpoint URL.
pub fn parse_endpoint(endpoint: &str) -> Result<Url, SyncError> {
    let url = Url::parse(endpoint.trim())
        .map_err(|e| SyncError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SyncError::InvalidEndpoint(format!(
            "{endpoint}: unsupported scheme '{other}'"
        ))),
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SyncError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(SyncError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| SyncError::MalformedResponse(e.to_string()))
}

fn ensure_success(success: Option<bool>, error: Option<String>) -> Result<(), SyncError> {
    if success == Some(false) {
        return Err(SyncError::Rejected(
            error.unwrap_or_else(|| "success=false".to_string()),
        ));
    }
    Ok(())
}

#[async_trait]
impl ExternalCalendar for MirrorClient {
    async fn mirror_mutations(&self, batch: MirrorBatch) -> Result<MirrorCounts, SyncError> {
        let upserts = prepare_upserts(&batch.upserts, self.tz);
        let deletes = prepare_deletes(&batch.deletes);
        if upserts.is_empty() && deletes.is_empty() {
            debug!("nothing to mirror");
            return Ok(MirrorCounts::default());
        }

        let request = MutationsRequest {
            action: "mutations",
            upserts: &upserts,
            deletes: &deletes,
        };
        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;
        let parsed: MutationsResponse = read_json(response).await?;
        ensure_success(parsed.success, parsed.error)?;

        debug!(counts = %parsed.counts, "mirrored mutations");
        Ok(parsed.counts)
    }

    async fn pull_events(&self, range: &AllowedRange) -> Result<Vec<ExternalEvent>, SyncError> {
        let (time_min, time_max) = range.window_iso(self.tz);
        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&[
                ("action", "events"),
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
            ])
            .send()
            .await?;
        let parsed: EventsResponse = read_json(response).await?;
        ensure_success(parsed.success, parsed.error)?;

        info!(count = parsed.events.len(), "pulled external events");
        Ok(parsed.events)
    }

    async fn push_full_sync(
        &self,
        events: &[Event],
        range: &AllowedRange,
    ) -> Result<MirrorCounts, SyncError> {
        let items: Vec<UpsertItem> = full_sync_candidates(events, range)
            .into_iter()
            .map(|e| UpsertItem::from_event(e, self.tz))
            .collect();
        let envelope = ExportEnvelope::new(items);

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&envelope)
            .send()
            .await?;
        let parsed: FullSyncResponse = read_json(response).await?;
        ensure_success(parsed.success, parsed.error)?;

        let counts = MirrorCounts {
            created: parsed.created,
            updated: parsed.updated,
            deleted: 0,
            skipped: parsed.skipped,
        };
        info!(sent = envelope.event_count, %counts, "full sync pushed");
        Ok(counts)
    }

    async fn clear(&self) -> Result<usize, SyncError> {
        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&[("action", "clear"), ("tag", self.tag.as_str())])
            .send()
            .await?;
        let parsed: ClearResponse = read_json(response).await?;
        ensure_success(parsed.success, parsed.error)?;

        info!(deleted = parsed.deleted, tag = %self.tag, "cleared external events");
        Ok(parsed.deleted)
    }
}
