//! Calendar event model.
//!
//! Field names serialize in camelCase so records stay readable by every
//! client sharing the realtime store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::sync::normalize::{all_day_bounds, normalize_date_time_string, parse_normalized};
use chrono_tz::Tz;

/// Default event color.
pub const DEFAULT_COLOR: &str = "#3b82f6";
/// Maximum title length, in characters.
pub const MAX_TITLE_LEN: usize = 100;
/// Maximum description length, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Recurrence rule. Expansion is left to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

/// Where an event was first created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    #[default]
    Local,
    Google,
}

/// Canonical event record as held in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Assigned by the local store on creation.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    /// `YYYY-MM-DDTHH:MM`, or empty when unknown.
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default)]
    pub recurrence: Recurrence,
    /// Inclusive `YYYY-MM-DD`.
    #[serde(default)]
    pub recurrence_end: Option<String>,
    #[serde(default)]
    pub reminder_minutes: Option<u32>,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub is_timetable: bool,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default)]
    pub google_event_id: Option<String>,
    #[serde(default)]
    pub is_google_imported: bool,
    #[serde(default)]
    pub external_updated_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_write_client_id: Option<String>,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

impl Event {
    /// True when the event came in through the external-calendar pull path.
    pub fn is_google_origin(&self) -> bool {
        self.source == EventSource::Google || self.is_google_imported
    }

    /// Identity of the last write, used to drop change notifications this
    /// session produced itself.
    pub fn fingerprint(&self) -> (Option<DateTime<Utc>>, Option<&str>) {
        (self.updated_at, self.last_write_client_id.as_deref())
    }

    /// Pin an all-day event to `T00:00` on its start date and `T23:59` on its
    /// end date. Unparseable times are left alone for `validate` to report.
    fn snap_to_whole_days(&mut self) {
        if !self.all_day {
            return;
        }
        let Some(start) = parse_normalized(&self.start_time) else {
            return;
        };
        let end_date = parse_normalized(&self.end_time)
            .map(|end| end.date())
            .unwrap_or(start.date())
            .max(start.date());
        self.start_time = all_day_bounds(start.date()).0;
        self.end_time = all_day_bounds(end_date).1;
    }

    /// Check the bounds enforced at entry creation time.
    ///
    /// # Errors
    /// Returns the first violated bound.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::TitleRequired);
        }
        let title_len = title.chars().count();
        if title_len > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong {
                len: title_len,
                max: MAX_TITLE_LEN,
            });
        }

        let description_len = self.description.chars().count();
        if description_len > MAX_DESCRIPTION_LEN {
            return Err(ValidationError::DescriptionTooLong {
                len: description_len,
                max: MAX_DESCRIPTION_LEN,
            });
        }

        let start = parse_normalized(&self.start_time).ok_or_else(|| {
            ValidationError::InvalidValue {
                field: "startTime".into(),
                message: format!("'{}' is not a date-time", self.start_time),
            }
        })?;
        let end = parse_normalized(&self.end_time).ok_or_else(|| ValidationError::InvalidValue {
            field: "endTime".into(),
            message: format!("'{}' is not a date-time", self.end_time),
        })?;

        if end <= start {
            return Err(ValidationError::InvalidTimeRange {
                start: self.start_time.clone(),
                end: self.end_time.clone(),
            });
        }

        Ok(())
    }
}

/// Caller-supplied fields for a new event. The store assigns the id and the
/// mutator stamps timestamps and the writer id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub location: String,
    pub start_time: String,
    pub end_time: String,
    pub all_day: bool,
    pub recurrence: Recurrence,
    pub recurrence_end: Option<String>,
    pub reminder_minutes: Option<u32>,
    pub color: Option<String>,
    pub is_timetable: bool,
    pub source: EventSource,
    pub google_event_id: Option<String>,
    pub is_google_imported: bool,
    pub external_updated_at: Option<String>,
}

impl EventDraft {
    pub fn new(title: impl Into<String>, start_time: impl Into<String>, end_time: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            ..Default::default()
        }
    }

    /// Build an id-less event with start/end normalized in `tz`. All-day
    /// events cover whole days.
    pub fn into_event(self, tz: Tz) -> Event {
        let mut event = Event {
            id: String::new(),
            title: self.title,
            description: self.description,
            location: self.location,
            start_time: normalize_date_time_string(&self.start_time, tz),
            end_time: normalize_date_time_string(&self.end_time, tz),
            all_day: self.all_day,
            recurrence: self.recurrence,
            recurrence_end: self.recurrence_end,
            reminder_minutes: self.reminder_minutes,
            color: self.color.unwrap_or_else(default_color),
            is_timetable: self.is_timetable,
            source: self.source,
            google_event_id: self.google_event_id,
            is_google_imported: self.is_google_imported,
            external_updated_at: self.external_updated_at,
            created_at: None,
            updated_at: None,
            last_write_client_id: None,
        };
        event.snap_to_whole_days();
        event
    }
}

/// Partial update. `None` leaves the existing value untouched; the nested
/// options on `reminder_minutes` and `recurrence_end` allow clearing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub all_day: Option<bool>,
    pub recurrence: Option<Recurrence>,
    pub recurrence_end: Option<Option<String>>,
    pub reminder_minutes: Option<Option<u32>>,
    pub color: Option<String>,
    pub is_timetable: Option<bool>,
    pub source: Option<EventSource>,
    pub google_event_id: Option<String>,
    pub is_google_imported: Option<bool>,
    pub external_updated_at: Option<String>,
}

impl EventPatch {
    /// Merge the patch onto `existing`. Start/end are re-normalized and
    /// snapped to whole days for all-day events; the sync-identity flags
    /// keep whichever side is set.
    pub fn apply_to(self, existing: &Event, tz: Tz) -> Event {
        let mut merged = existing.clone();

        if let Some(title) = self.title {
            merged.title = title;
        }
        if let Some(description) = self.description {
            merged.description = description;
        }
        if let Some(location) = self.location {
            merged.location = location;
        }
        if let Some(start) = self.start_time {
            merged.start_time = start;
        }
        if let Some(end) = self.end_time {
            merged.end_time = end;
        }
        merged.start_time = normalize_date_time_string(&merged.start_time, tz);
        merged.end_time = normalize_date_time_string(&merged.end_time, tz);
        if let Some(all_day) = self.all_day {
            merged.all_day = all_day;
        }
        if let Some(recurrence) = self.recurrence {
            merged.recurrence = recurrence;
        }
        if let Some(recurrence_end) = self.recurrence_end {
            merged.recurrence_end = recurrence_end;
        }
        if let Some(reminder) = self.reminder_minutes {
            merged.reminder_minutes = reminder;
        }
        if let Some(color) = self.color {
            merged.color = color;
        }

        merged.is_timetable = existing.is_timetable || self.is_timetable.unwrap_or(false);
        merged.is_google_imported =
            existing.is_google_imported || self.is_google_imported.unwrap_or(false);
        if existing.source == EventSource::Google || self.source == Some(EventSource::Google) {
            merged.source = EventSource::Google;
        }
        merged.google_event_id = self.google_event_id.or_else(|| existing.google_event_id.clone());
        merged.external_updated_at = self
            .external_updated_at
            .or_else(|| existing.external_updated_at.clone());

        merged.snap_to_whole_days();
        merged
    }
}
