// SPDX-License-Identifier: MIT

//! Time helpers. All timestamps are stored as RFC 3339 UTC strings, which
//! sort lexicographically, so range queries compare strings directly.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Canonical storage format: RFC 3339 with second precision, Z suffix.
pub fn format_utc_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Midnight UTC of the current day, formatted for range queries.
pub fn day_start(now: DateTime<Utc>) -> String {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| now.naive_utc());
    format_utc_rfc3339(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

/// `hours` before now, formatted for range queries.
pub fn hours_ago(now: DateTime<Utc>, hours: i64) -> String {
    format_utc_rfc3339(now - Duration::hours(hours))
}

/// `days` before now, formatted for range queries.
pub fn days_ago(now: DateTime<Utc>, days: i64) -> String {
    format_utc_rfc3339(now - Duration::days(days))
}

/// Parse a provider timestamp, accepting RFC 3339 with any offset.
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
