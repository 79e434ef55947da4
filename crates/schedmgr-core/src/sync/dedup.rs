//! Duplicate grouping by date and normalized title.
//!
//! Two events on the same day whose titles match after stripping whitespace
//! and case are "the same event" for dedup purposes. Within a group a
//! Google-origin copy always wins over local copies.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::event::{Event, EventSource};
use crate::sync::mutator::{EventMutator, Propagation};
use crate::sync::normalize::format_date_only;
use crate::sync::range::AllowedRange;
use crate::sync::types::SyncError;

/// Trim, drop all whitespace, lowercase.
pub fn normalize_title(title: &str) -> String {
    title
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// `"{date}__{normalized title}"`, or `None` without a date.
pub fn build_group_key(start_time: &str, title: &str) -> Option<String> {
    let date = format_date_only(start_time);
    if date.is_empty() {
        return None;
    }
    Some(format!("{date}__{}", normalize_title(title)))
}

/// Lightweight view of a local event held in the group map.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMember {
    pub id: String,
    pub title: String,
    pub start_time: String,
    pub source: EventSource,
    pub is_google_imported: bool,
    pub google_event_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl GroupMember {
    pub fn is_google_origin(&self) -> bool {
        self.source == EventSource::Google || self.is_google_imported
    }
}

impl From<&Event> for GroupMember {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            start_time: event.start_time.clone(),
            source: event.source,
            is_google_imported: event.is_google_imported,
            google_event_id: event.google_event_id.clone(),
            updated_at: event.updated_at,
        }
    }
}

/// Group key to candidates, in input order.
pub type GroupMap = BTreeMap<String, Vec<GroupMember>>;

/// Partition in-range, non-timetable events by group key.
pub fn group_events<'a, I>(events: I, range: &AllowedRange) -> GroupMap
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut groups = GroupMap::new();
    for event in events {
        if event.id.is_empty() || event.is_timetable || !range.contains(event) {
            continue;
        }
        if let Some(key) = build_group_key(&event.start_time, &event.title) {
            groups.entry(key).or_default().push(GroupMember::from(event));
        }
    }
    groups
}

/// Index of the member to keep: the most recently updated Google-origin
/// member if there is one, otherwise the most recently updated member.
/// Ties go to the earlier member.
pub fn pick_survivor(members: &[GroupMember]) -> Option<usize> {
    let has_google = members.iter().any(GroupMember::is_google_origin);

    let mut best: Option<usize> = None;
    for (idx, member) in members.iter().enumerate() {
        if has_google && !member.is_google_origin() {
            continue;
        }
        match best {
            Some(current) if members[current].updated_at >= member.updated_at => {}
            _ => best = Some(idx),
        }
    }
    best
}

/// Ids to delete so that each group keeps exactly its survivor.
pub fn plan_dedup<'a, I>(events: I, range: &AllowedRange) -> Vec<String>
where
    I: IntoIterator<Item = &'a Event>,
{
    let mut doomed = Vec::new();
    for (key, members) in group_events(events, range) {
        if members.len() < 2 {
            continue;
        }
        let Some(survivor) = pick_survivor(&members) else {
            continue;
        };
        debug!(group = %key, keep = %members[survivor].id, dropped = members.len() - 1, "dedup group");
        doomed.extend(
            members
                .into_iter()
                .enumerate()
                .filter(|(idx, _)| *idx != survivor)
                .map(|(_, member)| member.id),
        );
    }
    doomed
}

/// Standalone maintenance pass over the whole local store. Deletes never
/// reach the external calendar; a failed delete leaves that record in place.
///
/// # Errors
/// Fails only when the store cannot be read.
pub async fn dedupe_store(mutator: &EventMutator, range: &AllowedRange) -> Result<usize, SyncError> {
    let events = mutator.store().fetch_starting_by(&range.latest_start()).await?;
    let doomed = plan_dedup(&events, range);

    let mut deleted = 0;
    for id in doomed {
        match mutator.delete_event(&id, Propagation::LocalOnly).await {
            Ok(true) => deleted += 1,
            Ok(false) => debug!(%id, "duplicate already gone"),
            Err(err) => warn!(%id, error = %err, "failed to delete duplicate"),
        }
    }
    Ok(deleted)
}
