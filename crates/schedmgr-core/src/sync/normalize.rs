//! Canonical date-time shapes.
//!
//! Every write path stores start/end as `YYYY-MM-DDTHH:MM` in the calendar's
//! zone so the rest of the sync code can compare times as plain strings.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc,
};
use chrono_tz::Tz;

/// Stored date-time shape.
pub const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M";
/// Date-only shape.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a zone-less date-time or date-only string. Date-only values land on
/// midnight.
pub fn parse_normalized(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, DATE_FORMAT)
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// RFC 3339, plus the minute-precision variant (`2025-06-02T09:00Z`).
fn parse_with_offset(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }

    let expanded = match value.strip_suffix('Z').or_else(|| value.strip_suffix('z')) {
        Some(prefix) => format!("{prefix}+00:00"),
        None => value.to_string(),
    };
    DateTime::parse_from_str(&expanded, "%Y-%m-%dT%H:%M%:z").ok()
}

/// Parse any accepted input into wall-clock time in `tz`. Offset-qualified
/// values are converted; zone-less values are taken as already local.
pub fn parse_local(value: &str, tz: Tz) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    match parse_with_offset(value) {
        Some(dt) => Some(dt.with_timezone(&tz).naive_local()),
        None => parse_normalized(value),
    }
}

/// Format wall-clock time in the stored shape.
pub fn format_local(value: NaiveDateTime) -> String {
    value.format(LOCAL_FORMAT).to_string()
}

/// Canonicalize to `YYYY-MM-DDTHH:MM`, or `""` when unparseable.
/// Normalizing an already-normalized string returns it unchanged.
pub fn normalize_date_time_string(value: &str, tz: Tz) -> String {
    parse_local(value, tz).map(format_local).unwrap_or_default()
}

/// Wall-clock time exactly as written, ignoring any offset.
pub fn parse_as_written(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    match parse_with_offset(value) {
        Some(dt) => Some(dt.naive_local()),
        None => parse_normalized(value),
    }
}

/// Extract `YYYY-MM-DD` from a date-only or date-time string, or `""`.
/// Offset-qualified input keeps the date as written.
pub fn format_date_only(value: &str) -> String {
    parse_as_written(value)
        .map(|dt| dt.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Convert a stored local value into an ISO-8601 UTC instant with
/// millisecond precision, as the external calendar expects.
pub fn to_iso8601(value: &str, tz: Tz) -> Option<String> {
    let naive = parse_local(value, tz)?;
    Some(local_to_utc(naive, tz).to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Resolve wall-clock time in `tz` to an instant. Times inside a DST gap are
/// read as UTC wall-clock.
pub fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
        .with_timezone(&Utc)
}

/// Whole-day boundaries for an all-day event.
pub fn all_day_bounds(date: NaiveDate) -> (String, String) {
    let day = date.format(DATE_FORMAT);
    (format!("{day}T00:00"), format!("{day}T23:59"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keeps_normalized_value() {
        assert_eq!(
            normalize_date_time_string("2025-06-02T09:00", Tz::UTC),
            "2025-06-02T09:00"
        );
    }

    #[test]
    fn drops_seconds_and_fraction() {
        assert_eq!(
            normalize_date_time_string("2025-06-02T09:05:59.999", Tz::UTC),
            "2025-06-02T09:05"
        );
        assert_eq!(
            normalize_date_time_string("2025-06-02 09:05:30", Tz::UTC),
            "2025-06-02T09:05"
        );
    }

    #[test]
    fn converts_offsets_into_calendar_zone() {
        assert_eq!(
            normalize_date_time_string("2025-06-02T09:00:00Z", Tz::UTC),
            "2025-06-02T09:00"
        );
        assert_eq!(
            normalize_date_time_string("2025-06-02T09:00:00Z", Tz::Europe__Berlin),
            "2025-06-02T11:00"
        );
        assert_eq!(
            normalize_date_time_string("2025-06-02T09:00+02:00", Tz::UTC),
            "2025-06-02T07:00"
        );
        assert_eq!(
            normalize_date_time_string("2025-06-02T23:30:00Z", Tz::Asia__Tokyo),
            "2025-06-03T08:30"
        );
    }

    #[test]
    fn date_only_lands_on_midnight() {
        assert_eq!(
            normalize_date_time_string("2025-06-02", Tz::UTC),
            "2025-06-02T00:00"
        );
    }

    #[test]
    fn unparseable_is_empty() {
        assert_eq!(normalize_date_time_string("", Tz::UTC), "");
        assert_eq!(normalize_date_time_string("tomorrow", Tz::UTC), "");
        assert_eq!(normalize_date_time_string("2025-13-40T25:00", Tz::UTC), "");
    }

    #[test]
    fn date_only_extraction() {
        assert_eq!(format_date_only("2025-06-02T09:00"), "2025-06-02");
        assert_eq!(format_date_only("2025-06-02"), "2025-06-02");
        assert_eq!(format_date_only("2025-06-02T23:30:00-05:00"), "2025-06-02");
        assert_eq!(format_date_only("garbage"), "");
    }

    #[test]
    fn iso8601_is_utc_with_millis() {
        assert_eq!(
            to_iso8601("2025-06-02T09:00", Tz::UTC).as_deref(),
            Some("2025-06-02T09:00:00.000Z")
        );
        assert_eq!(
            to_iso8601("2025-06-02T11:00", Tz::Europe__Berlin).as_deref(),
            Some("2025-06-02T09:00:00.000Z")
        );
        assert_eq!(to_iso8601("", Tz::UTC), None);
    }

    #[test]
    fn all_day_bounds_cover_the_day() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        assert_eq!(
            all_day_bounds(date),
            ("2025-06-02T00:00".to_string(), "2025-06-02T23:59".to_string())
        );
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent_for_any_text(input in "\\PC{0,32}") {
            let once = normalize_date_time_string(&input, Tz::UTC);
            prop_assert_eq!(normalize_date_time_string(&once, Tz::UTC), once);
        }

        #[test]
        fn normalization_is_idempotent_for_timestamps(
            year in 1971i32..2100,
            month in 1u32..=12,
            day in 1u32..=28,
            hour in 0u32..24,
            minute in 0u32..60,
            second in 0u32..60,
            offset_hours in -11i32..=13,
            shape in 0usize..5,
        ) {
            let input = match shape {
                0 => format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}"),
                1 => format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}"),
                2 => format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.250"),
                3 => format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z"),
                _ => format!(
                    "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}{}{:02}:00",
                    if offset_hours < 0 { '-' } else { '+' },
                    offset_hours.abs()
                ),
            };

            for tz in [Tz::UTC, Tz::America__New_York, Tz::Asia__Kolkata] {
                let once = normalize_date_time_string(&input, tz);
                prop_assert!(!once.is_empty());
                prop_assert_eq!(normalize_date_time_string(&once, tz), once);
            }
        }
    }
}
