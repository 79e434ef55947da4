//! Sliding retention window that bounds the sync working set.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use chrono_tz::Tz;

use crate::event::Event;
use crate::sync::normalize::{local_to_utc, parse_normalized};

/// Window from the first day of the month six months back through
/// December 31 of next year, 23:59:59.999, in calendar wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowedRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl AllowedRange {
    /// Range around the current wall-clock time in `tz`.
    pub fn current(tz: Tz) -> Self {
        Self::at(Utc::now().with_timezone(&tz).naive_local())
    }

    /// Range around `now`. Out-of-calendar edges fall back to unbounded.
    pub fn at(now: NaiveDateTime) -> Self {
        let start = now
            .date()
            .with_day(1)
            .and_then(|first| first.checked_sub_months(Months::new(6)))
            .map(|date| date.and_time(NaiveTime::MIN))
            .unwrap_or(NaiveDateTime::MIN);

        let end = NaiveDate::from_ymd_opt(now.year() + 1, 12, 31)
            .and_then(|date| date.and_hms_milli_opt(23, 59, 59, 999))
            .unwrap_or(NaiveDateTime::MAX);

        Self { start, end }
    }

    /// Closed-interval overlap between the event and the range. All-day
    /// events compare by date; events without parseable start and end are
    /// outside.
    pub fn contains(&self, event: &Event) -> bool {
        let (Some(start), Some(end)) = (
            parse_normalized(&event.start_time),
            parse_normalized(&event.end_time),
        ) else {
            return false;
        };

        if event.all_day {
            start.date() <= self.end.date() && end.date() >= self.start.date()
        } else {
            start <= self.end && end >= self.start
        }
    }

    /// Upper bound for a store prefetch. Stored starts sort as strings, so
    /// any in-range event starts at or before this value.
    pub fn latest_start(&self) -> String {
        self.end.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
    }

    /// Polling window as ISO-8601 UTC instants.
    pub fn window_iso(&self, tz: Tz) -> (String, String) {
        (
            local_to_utc(self.start, tz).to_rfc3339_opts(SecondsFormat::Millis, true),
            local_to_utc(self.end, tz).to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }
}
