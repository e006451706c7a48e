//! Lenient timestamp (de)serialisation.
//!
//! Snapshots written by older front-ends store some timestamps as RFC 3339
//! strings and others as epoch milliseconds. Everything is revived into
//! `DateTime<Utc>` on load and written back as RFC 3339.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Float(f64),
    Text(String),
}

fn revive<E: de::Error>(raw: RawTimestamp) -> Result<DateTime<Utc>, E> {
    match raw {
        RawTimestamp::Millis(ms) => Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| E::custom(format!("timestamp out of range: {ms}"))),
        RawTimestamp::Float(ms) => Utc
            .timestamp_millis_opt(ms as i64)
            .single()
            .ok_or_else(|| E::custom(format!("timestamp out of range: {ms}"))),
        RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| E::custom(format!("invalid timestamp `{text}`: {e}"))),
    }
}

/// Deserialize a required timestamp from either representation.
pub fn flexible<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawTimestamp::deserialize(deserializer)?;
    revive(raw)
}

/// Deserialize an optional timestamp; `null` and missing both map to `None`.
pub fn flexible_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawTimestamp>::deserialize(deserializer)?;
    raw.map(revive).transpose()
}
