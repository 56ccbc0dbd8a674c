// Timestamp columns
//
// Stored as UTC text "YYYY-MM-DD HH:MM:SS.ffffff", the same shape as SQLite's
// CURRENT_TIMESTAMP, so legacy rows and ours compare correctly as strings.

use chrono::{DateTime, NaiveDateTime, Utc};

const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub(crate) fn encode(at: DateTime<Utc>) -> String {
    at.format(FORMAT).to_string()
}

pub(crate) fn encode_opt(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(encode)
}

/// Parse our format, legacy CURRENT_TIMESTAMP, ISO `T`-separated, or RFC 3339
pub(crate) fn decode(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn decode_opt(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().and_then(decode)
}
