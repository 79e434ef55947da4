//! Export and import of event documents.
//!
//! The export envelope doubles as the body of the external calendar's full
//! sync POST.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::event::{Event, EventDraft};

/// Value written to `source` in exported documents.
pub const EXPORT_SOURCE: &str = "schedmgr";

/// `{source, exportedAt, eventCount, events}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope<T> {
    pub source: String,
    pub exported_at: DateTime<Utc>,
    pub event_count: usize,
    pub events: Vec<T>,
}

impl<T> ExportEnvelope<T> {
    pub fn new(events: Vec<T>) -> Self {
        Self {
            source: EXPORT_SOURCE.to_string(),
            exported_at: Utc::now(),
            event_count: events.len(),
            events,
        }
    }
}

/// Snapshot of `events` ready to be written to a file.
pub fn export_events(events: &[Event]) -> ExportEnvelope<Event> {
    ExportEnvelope::new(events.to_vec())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportDocument {
    Envelope { events: Vec<EventDraft> },
    Bare(Vec<EventDraft>),
}

/// Parse an exported document (or a bare array of events) into drafts.
///
/// Every record is normalized in `tz` and validated; a single bad record
/// rejects the whole payload.
///
/// # Errors
/// [`ValidationError::MalformedPayload`] if the JSON has neither shape,
/// otherwise the first record's validation failure.
pub fn import_events(json: &str, tz: Tz) -> Result<Vec<EventDraft>, ValidationError> {
    let document: ImportDocument =
        serde_json::from_str(json).map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;
    let drafts = match document {
        ImportDocument::Envelope { events } | ImportDocument::Bare(events) => events,
    };

    let mut accepted = Vec::with_capacity(drafts.len());
    for (index, draft) in drafts.into_iter().enumerate() {
        let event = draft.clone().into_event(tz);
        event.validate().map_err(|err| match err {
            ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
                field: format!("events[{index}].{field}"),
                message,
            },
            other => other,
        })?;
        accepted.push(EventDraft {
            start_time: event.start_time,
            end_time: event.end_time,
            ..draft
        });
    }
    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_counts_events() {
        let event = EventDraft::new("Standup", "2025-06-02T09:00", "2025-06-02T09:30").into_event(Tz::UTC);
        let envelope = export_events(&[event]);
        assert_eq!(envelope.source, EXPORT_SOURCE);
        assert_eq!(envelope.event_count, 1);

        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("exportedAt").is_some());
        assert_eq!(json["eventCount"], 1);
    }

    #[test]
    fn import_accepts_envelope_and_bare_array() {
        let envelope = r#"{"source":"x","exportedAt":"2025-01-01T00:00:00Z","eventCount":1,
            "events":[{"title":"Standup","startTime":"2025-06-02T09:00:00","endTime":"2025-06-02 09:30"}]}"#;
        let drafts = import_events(envelope, Tz::UTC).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].start_time, "2025-06-02T09:00");
        assert_eq!(drafts[0].end_time, "2025-06-02T09:30");

        let bare = r#"[{"title":"Lunch","startTime":"2025-06-02T12:00","endTime":"2025-06-02T13:00"}]"#;
        assert_eq!(import_events(bare, Tz::UTC).unwrap()[0].title, "Lunch");
    }

    #[test]
    fn import_rejects_malformed_json() {
        assert!(matches!(
            import_events("{\"events\": 3}", Tz::UTC),
            Err(ValidationError::MalformedPayload(_))
        ));
        assert!(matches!(
            import_events("not json", Tz::UTC),
            Err(ValidationError::MalformedPayload(_))
        ));
    }

    #[test]
    fn import_rejects_whole_payload_on_one_bad_record() {
        let json = r#"[
            {"title":"Good","startTime":"2025-06-02T09:00","endTime":"2025-06-02T10:00"},
            {"title":"Backwards","startTime":"2025-06-02T11:00","endTime":"2025-06-02T10:00"}
        ]"#;
        assert!(matches!(
            import_events(json, Tz::UTC),
            Err(ValidationError::InvalidTimeRange { .. })
        ));
    }
}
