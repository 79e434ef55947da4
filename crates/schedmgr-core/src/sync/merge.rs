//! Reconciliation of pulled external events against the local store.
//!
//! Each incoming event is first collapsed into its date+title group: local
//! copies that cannot be linked to it are removed. It is then resolved by
//! identity (back-reference, then external id) and either updates the
//! linked local record or becomes a new Google-origin record. A final
//! dedup pass catches anything the per-event steps left behind.

use std::collections::{HashMap, HashSet};

use chrono::Duration;
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::event::{Event, EventDraft, EventPatch, EventSource};
use crate::sync::dedup::{build_group_key, dedupe_store, group_events, GroupMap, GroupMember};
use crate::sync::mirror::ExternalEvent;
use crate::sync::mutator::{EventMutator, Propagation};
use crate::sync::normalize::{
    all_day_bounds, format_date_only, normalize_date_time_string, parse_as_written,
};
use crate::sync::range::AllowedRange;
use crate::sync::types::{MergeSummary, SyncError};

/// Pulled event converted to local shape. Never stored directly.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub back_reference: Option<String>,
    pub event: Event,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn reminder_from_wire(value: Option<f64>) -> Option<u32> {
    value
        .filter(|m| m.is_finite() && *m >= 0.0)
        .map(|m| m.round() as u32)
}

/// All-day bounds from the external dates as written. An end at midnight of
/// a later day is exclusive and is pulled back one day.
fn all_day_times(start: &str, end: &str) -> Option<(String, String)> {
    let start = parse_as_written(start)?;
    let end = parse_as_written(end).unwrap_or(start);

    let start_date = start.date();
    let mut end_date = end.date();
    if end.time() == chrono::NaiveTime::MIN && end_date > start_date {
        end_date -= Duration::days(1);
    }

    let (start_time, _) = all_day_bounds(start_date);
    let (_, end_time) = all_day_bounds(end_date.max(start_date));
    Some((start_time, end_time))
}

/// Convert a pulled event. `None` when it has no usable start and end.
pub fn to_candidate(external: &ExternalEvent, tz: Tz) -> Option<Candidate> {
    let start = external.start_date_time.as_deref()?;
    let end = external.end_date_time.as_deref()?;
    let all_day = external.all_day.unwrap_or(false);

    let (start_time, end_time) = if all_day {
        all_day_times(start, end)?
    } else {
        (
            normalize_date_time_string(start, tz),
            normalize_date_time_string(end, tz),
        )
    };
    if start_time.is_empty() || end_time.is_empty() {
        return None;
    }

    let event = EventDraft {
        title: external.title.clone().unwrap_or_default(),
        description: external.clean_description(),
        location: external.location.clone().unwrap_or_default(),
        start_time,
        end_time,
        all_day,
        reminder_minutes: reminder_from_wire(external.reminder_minutes),
        source: EventSource::Google,
        google_event_id: non_empty(external.google_event_id.as_deref()),
        is_google_imported: true,
        external_updated_at: non_empty(external.last_updated.as_deref()),
        ..Default::default()
    }
    .into_event(tz);

    Some(Candidate {
        back_reference: external.back_reference(),
        event,
    })
}

fn text_key(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.is_empty())
}

/// Two all-day events match on dates alone.
fn times_differ(local: &Event, candidate: &Event) -> bool {
    if local.all_day && candidate.all_day {
        format_date_only(&local.start_time) != format_date_only(&candidate.start_time)
            || format_date_only(&local.end_time) != format_date_only(&candidate.end_time)
    } else {
        local.start_time != candidate.start_time || local.end_time != candidate.end_time
    }
}

/// True when any tracked field of `candidate` differs from `local`.
/// External ids and timestamps only count when the candidate carries one.
pub fn differs(local: &Event, candidate: &Event) -> bool {
    text_key(&local.title) != text_key(&candidate.title)
        || text_key(&local.description) != text_key(&candidate.description)
        || text_key(&local.location) != text_key(&candidate.location)
        || times_differ(local, candidate)
        || local.all_day != candidate.all_day
        || local.reminder_minutes != candidate.reminder_minutes
        || (candidate.google_event_id.is_some() && local.google_event_id != candidate.google_event_id)
        || (candidate.external_updated_at.is_some()
            && local.external_updated_at != candidate.external_updated_at)
}

fn patch_from(candidate: &Event) -> EventPatch {
    EventPatch {
        title: Some(candidate.title.clone()),
        description: Some(candidate.description.clone()),
        location: Some(candidate.location.clone()),
        start_time: Some(candidate.start_time.clone()),
        end_time: Some(candidate.end_time.clone()),
        all_day: Some(candidate.all_day),
        reminder_minutes: Some(candidate.reminder_minutes),
        google_event_id: candidate.google_event_id.clone(),
        is_google_imported: Some(true),
        external_updated_at: candidate.external_updated_at.clone(),
        ..Default::default()
    }
}

/// Remove `id` from whichever group holds it.
fn detach(groups: &mut GroupMap, id: &str) {
    groups.retain(|_, members| {
        members.retain(|m| m.id != id);
        !members.is_empty()
    });
}

/// Working copy of the local set for one merge.
struct LocalIndex {
    by_id: HashMap<String, Event>,
    by_external_id: HashMap<String, String>,
}

impl LocalIndex {
    fn new(events: Vec<Event>) -> Self {
        let mut index = Self {
            by_id: HashMap::new(),
            by_external_id: HashMap::new(),
        };
        for event in events {
            index.insert(event);
        }
        index
    }

    fn insert(&mut self, event: Event) {
        if event.id.is_empty() {
            return;
        }
        if let Some(gid) = event.google_event_id.clone().filter(|g| !g.is_empty()) {
            self.by_external_id.insert(gid, event.id.clone());
        }
        self.by_id.insert(event.id.clone(), event);
    }

    fn remove(&mut self, id: &str) {
        if let Some(event) = self.by_id.remove(id) {
            if let Some(gid) = event.google_event_id {
                if self.by_external_id.get(&gid).is_some_and(|linked| linked == id) {
                    self.by_external_id.remove(&gid);
                }
            }
        }
    }

    fn by_external_id(&self, gid: &str) -> Option<&Event> {
        self.by_external_id.get(gid).and_then(|id| self.by_id.get(id))
    }
}

fn keeper_ids(
    candidate: &Candidate,
    members: Option<&Vec<GroupMember>>,
    index: &LocalIndex,
) -> HashSet<String> {
    let mut keepers = HashSet::new();

    if let Some(id) = candidate.back_reference.as_ref().filter(|id| index.by_id.contains_key(*id)) {
        keepers.insert(id.clone());
    }

    let members = members.map(Vec::as_slice).unwrap_or_default();
    if let Some(gid) = candidate.event.google_event_id.as_deref() {
        for member in members {
            if member.google_event_id.as_deref() == Some(gid) {
                keepers.insert(member.id.clone());
            }
        }
    }

    if keepers.is_empty() {
        if let Some(member) = members.iter().find(|m| m.is_google_origin()) {
            keepers.insert(member.id.clone());
        }
    }

    keepers
}

/// Update `local` from `candidate` when a tracked field changed.
/// Returns the stored record on a real write.
async fn refresh_linked(
    mutator: &EventMutator,
    local: &Event,
    candidate: &Event,
    range: &AllowedRange,
) -> Option<Event> {
    if local.is_timetable || !range.contains(local) {
        debug!(id = %local.id, "linked event is timetable or out of range, leaving it");
        return None;
    }
    if !differs(local, candidate) {
        return None;
    }

    match mutator
        .update_event(&local.id, patch_from(candidate), Propagation::LocalOnly)
        .await
    {
        Ok(true) => match mutator.store().get(&local.id).await {
            Ok(Some(stored)) => Some(stored),
            Ok(None) => None,
            Err(err) => {
                warn!(id = %local.id, error = %err, "re-read after merge update failed");
                None
            }
        },
        Ok(false) => None,
        Err(err) => {
            warn!(id = %local.id, error = %err, "merge update failed");
            None
        }
    }
}

/// Merge `external` into the local store.
///
/// Writes made here never mirror back to the external calendar.
///
/// # Errors
/// Only when the local store cannot be read; per-record failures are
/// logged and skipped.
pub async fn merge_external_events(
    mutator: &EventMutator,
    external: &[ExternalEvent],
    range: &AllowedRange,
) -> Result<MergeSummary, SyncError> {
    let tz = mutator.tz();
    let local = mutator.store().fetch_all().await?;
    let mut groups = group_events(&local, range);
    let mut index = LocalIndex::new(local);
    let mut summary = MergeSummary::default();

    for incoming in external {
        let Some(candidate) = to_candidate(incoming, tz) else {
            debug!(external_id = ?incoming.google_event_id, "external event without usable times");
            continue;
        };
        if !range.contains(&candidate.event) {
            debug!(external_id = ?candidate.event.google_event_id, "external event out of range");
            continue;
        }

        let key = build_group_key(&candidate.event.start_time, &candidate.event.title);

        // Collapse the group down to the copies this event links to.
        if let Some(key) = key.as_ref() {
            let keepers = keeper_ids(&candidate, groups.get(key), &index);
            if let Some(members) = groups.remove(key) {
                let mut survivors = Vec::with_capacity(members.len());
                for member in members {
                    if keepers.contains(&member.id) {
                        survivors.push(member);
                        continue;
                    }
                    match mutator.delete_event(&member.id, Propagation::LocalOnly).await {
                        Ok(true) => {
                            debug!(id = %member.id, group = %key, "removed unlinked group member");
                            summary.deleted += 1;
                            index.remove(&member.id);
                        }
                        Ok(false) => index.remove(&member.id),
                        Err(err) => {
                            warn!(id = %member.id, error = %err, "failed to remove group member");
                            survivors.push(member);
                        }
                    }
                }
                if !survivors.is_empty() {
                    groups.insert(key.clone(), survivors);
                }
            }
        }

        // Resolve by back-reference, then by external id, else create.
        let by_back_reference = candidate
            .back_reference
            .as_ref()
            .and_then(|id| index.by_id.get(id))
            .cloned();

        if let Some(linked) = by_back_reference {
            if let Some(stored) = refresh_linked(mutator, &linked, &candidate.event, range).await {
                summary.updated += 1;
                detach(&mut groups, &stored.id);
                if let Some(key) = build_group_key(&stored.start_time, &stored.title) {
                    groups.entry(key).or_default().push(GroupMember::from(&stored));
                }
                index.remove(&stored.id);
                index.insert(stored);
            }
            continue;
        }

        let by_external_id = candidate
            .event
            .google_event_id
            .as_deref()
            .and_then(|gid| index.by_external_id(gid))
            .cloned();

        if let Some(linked) = by_external_id {
            if let Some(stored) = refresh_linked(mutator, &linked, &candidate.event, range).await {
                summary.updated += 1;
                index.remove(&stored.id);
                index.insert(stored);
            }
            continue;
        }

        let draft = EventDraft {
            title: candidate.event.title.clone(),
            description: candidate.event.description.clone(),
            location: candidate.event.location.clone(),
            start_time: candidate.event.start_time.clone(),
            end_time: candidate.event.end_time.clone(),
            all_day: candidate.event.all_day,
            reminder_minutes: candidate.event.reminder_minutes,
            source: EventSource::Google,
            google_event_id: candidate.event.google_event_id.clone(),
            is_google_imported: true,
            external_updated_at: candidate.event.external_updated_at.clone(),
            ..Default::default()
        };
        match mutator.add_event(draft, Propagation::LocalOnly).await {
            Ok(id) => {
                summary.created += 1;
                let mut created = candidate.event.clone();
                created.id = id;
                debug!(id = %created.id, title = %created.title, "imported external event");
                if let Some(key) = key {
                    groups.entry(key).or_default().push(GroupMember::from(&created));
                }
                index.insert(created);
            }
            Err(err) => warn!(title = %candidate.event.title, error = %err, "failed to import external event"),
        }
    }

    match dedupe_store(mutator, range).await {
        Ok(removed) => summary.deleted += removed,
        Err(err) => warn!(error = %err, "post-merge dedup failed"),
    }

    info!(%summary, pulled = external.len(), "merge complete");
    Ok(summary)
}
