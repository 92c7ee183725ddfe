//! ISO-8601 timestamps for stored records.
//!
//! UTC with millisecond precision and a `Z` suffix, e.g.
//! `2024-01-01T00:00:00.000Z`. Values order lexicographically.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Current time as an ISO-8601 string.
pub fn now_iso() -> String {
    format_iso(Utc::now())
}

/// Current time, bumped to at least 1ms after `previous` when the clock has
/// not advanced past it. Keeps `updated_at` strictly increasing per record.
pub fn now_after(previous: Option<&str>) -> String {
    let now = Utc::now();
    let floor = previous
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc) + Duration::milliseconds(1));

    match floor {
        Some(floor) if floor > now => format_iso(floor),
        _ => format_iso(now),
    }
}

fn format_iso(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
