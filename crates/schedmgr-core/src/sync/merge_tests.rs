//! Tests for merging pulled external events into the local store.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono_tz::Tz;

    use crate::event::{Event, EventDraft, EventSource};
    use crate::sync::mutator::Propagation;
    use crate::storage::{EventStore, MemoryStore};
    use crate::sync::backref::back_reference_marker;
    use crate::sync::merge::*;
    use crate::sync::mirror::ExternalEvent;
    use crate::sync::test_support::*;
    use crate::sync::types::MergeSummary;

    async fn all(store: &MemoryStore) -> Vec<Event> {
        store.fetch_all().await.unwrap()
    }

    #[tokio::test]
    async fn test_scenario_unlinked_local_copy_is_replaced() {
        let store = Arc::new(MemoryStore::with_events([local_event(
            "a1",
            "Standup",
            "2025-06-02T09:00",
            "2025-06-02T09:30",
        )]));
        let fake = FakeCalendar::new();
        let mutator = mutator(&store, Some(fake.clone()));
        let pulled = [external("g1", "Standup", "2025-06-02T09:00:00Z", "2025-06-02T09:30:00Z")];

        let summary = merge_external_events(&mutator, &pulled, &june_range()).await.unwrap();

        assert_eq!(
            summary,
            MergeSummary {
                created: 1,
                updated: 0,
                deleted: 1
            }
        );
        let events = all(&store).await;
        assert_eq!(events.len(), 1);
        assert_ne!(events[0].id, "a1");
        assert_eq!(events[0].source, EventSource::Google);
        assert!(events[0].is_google_imported);
        assert_eq!(events[0].google_event_id.as_deref(), Some("g1"));
        assert!(fake.batches().is_empty(), "merge writes must not mirror");
    }

    #[tokio::test]
    async fn test_merge_create_into_empty_group() {
        let store = Arc::new(MemoryStore::with_events([local_event(
            "a1",
            "Standup",
            "2025-06-02T09:00",
            "2025-06-02T09:30",
        )]));
        let mutator = mutator(&store, None);
        let pulled = [external("g2", "Dentist", "2025-06-04T15:00:00Z", "2025-06-04T16:00:00Z")];

        let summary = merge_external_events(&mutator, &pulled, &june_range()).await.unwrap();

        assert_eq!(
            summary,
            MergeSummary {
                created: 1,
                updated: 0,
                deleted: 0
            }
        );
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_identical_linked_event_is_not_rewritten() {
        let mut linked = google_event("l1", "Review", "2025-06-05T10:00", "2025-06-05T11:00", "g5");
        linked.external_updated_at = Some("2025-06-01T00:00:00Z".into());
        let store = Arc::new(MemoryStore::with_events([linked]));
        let mutator = mutator(&store, None);

        let mut pulled = external("g5", "Review", "2025-06-05T10:00:00Z", "2025-06-05T11:00:00Z");
        pulled.last_updated = Some("2025-06-01T00:00:00Z".into());
        pulled.description = Some(String::new());

        let summary = merge_external_events(&mutator, &[pulled], &june_range()).await.unwrap();

        assert_eq!(summary, MergeSummary::default());
        assert!(store.journal().is_empty());
    }

    #[tokio::test]
    async fn test_back_reference_links_and_updates() {
        let store = Arc::new(MemoryStore::with_events([local_event(
            "a1",
            "Standup",
            "2025-06-02T09:00",
            "2025-06-02T09:30",
        )]));
        let mutator = mutator(&store, None);

        let mut pulled = external("g1", "Standup", "2025-06-02T09:00:00Z", "2025-06-02T09:45:00Z");
        pulled.description = Some(format!("Bring notes\n{}", back_reference_marker("a1")));

        let summary = merge_external_events(&mutator, &[pulled.clone()], &june_range())
            .await
            .unwrap();
        assert_eq!(
            summary,
            MergeSummary {
                created: 0,
                updated: 1,
                deleted: 0
            }
        );

        let stored = store.get("a1").await.unwrap().unwrap();
        assert_eq!(stored.end_time, "2025-06-02T09:45");
        assert_eq!(stored.description, "Bring notes");
        assert_eq!(stored.google_event_id.as_deref(), Some("g1"));
        assert!(stored.is_google_imported);

        let again = merge_external_events(&mutator, &[pulled], &june_range()).await.unwrap();
        assert_eq!(again, MergeSummary::default());
    }

    #[tokio::test]
    async fn test_schedule_mgr_id_takes_precedence_over_marker() {
        let store = Arc::new(MemoryStore::with_events([
            local_event("a1", "Standup", "2025-06-02T09:00", "2025-06-02T09:30"),
            local_event("b2", "Other", "2025-06-03T09:00", "2025-06-03T09:30"),
        ]));
        let mutator = mutator(&store, None);

        let mut pulled = external("g1", "Other", "2025-06-03T09:00:00Z", "2025-06-03T09:30:00Z");
        pulled.schedule_mgr_id = Some("b2".into());
        pulled.description = Some(back_reference_marker("a1"));

        let summary = merge_external_events(&mutator, &[pulled], &june_range()).await.unwrap();
        assert_eq!(summary.updated, 1);
        assert_eq!(store.get("b2").await.unwrap().unwrap().google_event_id.as_deref(), Some("g1"));
        assert!(store.get("a1").await.unwrap().unwrap().google_event_id.is_none());
    }

    #[tokio::test]
    async fn test_external_id_link_updates_moved_event() {
        let store = Arc::new(MemoryStore::with_events([google_event(
            "l1",
            "Review",
            "2025-06-05T10:00",
            "2025-06-05T11:00",
            "g5",
        )]));
        let mutator = mutator(&store, None);
        let pulled = [external("g5", "Review", "2025-06-06T10:00:00Z", "2025-06-06T11:00:00Z")];

        let summary = merge_external_events(&mutator, &pulled, &june_range()).await.unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.created, 0);
        let stored = store.get("l1").await.unwrap().unwrap();
        assert_eq!(stored.start_time, "2025-06-06T10:00");
    }

    #[tokio::test]
    async fn test_linked_timetable_event_is_left_alone() {
        let mut timetable = local_event("t1", "Math", "2025-06-02T09:00", "2025-06-02T10:00");
        timetable.is_timetable = true;
        let store = Arc::new(MemoryStore::with_events([timetable]));
        let mutator = mutator(&store, None);

        let mut pulled = external("g9", "Math", "2025-06-02T09:00:00Z", "2025-06-02T11:00:00Z");
        pulled.schedule_mgr_id = Some("t1".into());

        let summary = merge_external_events(&mutator, &[pulled], &june_range()).await.unwrap();
        assert_eq!(summary, MergeSummary::default());
        assert_eq!(store.get("t1").await.unwrap().unwrap().end_time, "2025-06-02T10:00");
    }

    #[tokio::test]
    async fn test_existing_google_copy_is_kept_as_keeper() {
        let store = Arc::new(MemoryStore::with_events([
            google_event("g-old", "Standup", "2025-06-02T09:00", "2025-06-02T09:30", "other"),
            local_event("a1", "Standup", "2025-06-02T09:00", "2025-06-02T09:30"),
        ]));
        let mutator = mutator(&store, None);
        let pulled = [external("g1", "Standup", "2025-06-02T09:00:00Z", "2025-06-02T09:30:00Z")];

        let summary = merge_external_events(&mutator, &pulled, &june_range()).await.unwrap();

        // a1 dropped as unlinked, the new copy is created, and the final
        // dedup pass collapses the two Google-origin copies into one.
        assert_eq!(summary.created, 1);
        assert_eq!(summary.deleted, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_skips_out_of_range_and_timeless_events() {
        let store = Arc::new(MemoryStore::new());
        let mutator = mutator(&store, None);
        let pulled = [
            external("old", "Ancient", "2001-01-01T09:00:00Z", "2001-01-01T10:00:00Z"),
            ExternalEvent {
                google_event_id: Some("none".into()),
                title: Some("No times".into()),
                ..Default::default()
            },
            external("bad", "Garbage", "someday", "later"),
        ];

        let summary = merge_external_events(&mutator, &pulled, &june_range()).await.unwrap();
        assert_eq!(summary, MergeSummary::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_per_item_failures_are_isolated() {
        let store = Arc::new(MemoryStore::with_events([local_event(
            "a1",
            "Standup",
            "2025-06-02T09:00",
            "2025-06-02T09:30",
        )]));
        store.reject_writes(true);
        let mutator = mutator(&store, None);
        let pulled = [external("g1", "Standup", "2025-06-02T09:00:00Z", "2025-06-02T09:30:00Z")];

        let summary = merge_external_events(&mutator, &pulled, &june_range()).await.unwrap();
        assert_eq!(summary, MergeSummary::default());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_candidate_all_day_uses_whole_day_bounds() {
        let pulled = ExternalEvent {
            all_day: Some(true),
            start_date_time: Some("2025-06-02".into()),
            end_date_time: Some("2025-06-03".into()),
            title: Some("Holiday".into()),
            ..Default::default()
        };
        let candidate = to_candidate(&pulled, Tz::America__New_York).unwrap();
        assert_eq!(candidate.event.start_time, "2025-06-02T00:00");
        assert_eq!(candidate.event.end_time, "2025-06-02T23:59");
        assert!(candidate.event.all_day);
    }

    #[test]
    fn test_candidate_reminder_and_blank_fields() {
        let mut pulled = external("  ", "Call", "2025-06-02T09:00:00Z", "2025-06-02T09:30:00Z");
        pulled.reminder_minutes = Some(-5.0);
        pulled.last_updated = Some(String::new());
        let candidate = to_candidate(&pulled, Tz::UTC).unwrap();
        assert_eq!(candidate.event.reminder_minutes, None);
        assert_eq!(candidate.event.google_event_id, None);
        assert_eq!(candidate.event.external_updated_at, None);

        pulled.reminder_minutes = Some(10.0);
        assert_eq!(to_candidate(&pulled, Tz::UTC).unwrap().event.reminder_minutes, Some(10));
    }

    #[test]
    fn test_differs_treats_empty_as_missing() {
        let local = local_event("a1", "Standup", "2025-06-02T09:00", "2025-06-02T09:30");
        let mut candidate = local.clone();
        candidate.google_event_id = None;
        assert!(!differs(&local, &candidate));

        candidate.location = "Room 1".into();
        assert!(differs(&local, &candidate));
    }

    #[test]
    fn test_differs_compares_all_day_events_by_date() {
        let mut local = local_event("a1", "Holiday", "2025-06-02T00:00", "2025-06-02T23:59");
        local.all_day = true;
        let mut candidate = local.clone();
        candidate.start_time = "2025-06-02T10:00".into();
        candidate.end_time = "2025-06-02T11:00".into();
        assert!(!differs(&local, &candidate));

        candidate.end_time = "2025-06-03T23:59".into();
        assert!(differs(&local, &candidate));

        candidate = local.clone();
        candidate.all_day = false;
        assert!(differs(&local, &candidate));
    }

    #[tokio::test]
    async fn test_all_day_local_add_is_stable_across_pull() {
        let store = Arc::new(MemoryStore::new());
        let mutator = mutator(&store, Some(FakeCalendar::new()));
        let draft = EventDraft {
            all_day: true,
            ..EventDraft::new("Holiday", "2025-06-02T10:00", "2025-06-02T11:00")
        };
        let id = mutator.add_event(draft, Propagation::Mirror).await.unwrap();

        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.start_time, "2025-06-02T00:00");
        assert_eq!(stored.end_time, "2025-06-02T23:59");

        let mut pulled = external("g-hol", "Holiday", "2025-06-02", "2025-06-03");
        pulled.all_day = Some(true);
        pulled.google_event_id = None;
        let candidate = to_candidate(&pulled, Tz::UTC).unwrap();
        assert!(!differs(&stored, &candidate.event));
    }
}
