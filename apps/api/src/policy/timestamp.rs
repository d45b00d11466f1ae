//! Decoding of the instant encodings found in stored policy documents.
//!
//! Documents written by different generations of the application carry
//! timestamps as store wrappers (`{seconds, nanoseconds}`, or the admin
//! SDK's `{_seconds, _nanoseconds}`), RFC 3339 strings, bare `YYYY-MM-DD`
//! dates, or epoch milliseconds. All of them resolve to one UTC instant.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct StoreTimestamp {
    #[serde(alias = "_seconds")]
    pub seconds: i64,
    #[serde(default, alias = "_nanoseconds")]
    pub nanoseconds: u32,
}

/// Structured wrapper is tried first, then the string and numeric forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawInstant {
    Wrapped(StoreTimestamp),
    Text(String),
    EpochMillis(i64),
}

impl RawInstant {
    pub fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            RawInstant::Wrapped(ts) => Utc.timestamp_opt(ts.seconds, ts.nanoseconds).single(),
            RawInstant::Text(text) => parse_text_instant(text),
            RawInstant::EpochMillis(ms) => Utc.timestamp_millis_opt(*ms).single(),
        }
    }
}

/// The value had a shape no known timestamp encoding accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnrecognizedInstant;

/// Decodes an optional field. `None` and JSON `null` both mean absent.
pub fn decode_instant(value: Option<&Value>) -> Result<Option<DateTime<Utc>>, UnrecognizedInstant> {
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    let raw: RawInstant =
        serde_json::from_value(value.clone()).map_err(|_| UnrecognizedInstant)?;
    raw.resolve().map(Some).ok_or(UnrecognizedInstant)
}

/// Store-side sort instant of a raw document: its `createdAt`, or the epoch
/// when absent or unreadable so such documents sort last.
pub fn sort_instant(data: &Value) -> DateTime<Utc> {
    decode_instant(data.get("createdAt"))
        .ok()
        .flatten()
        .unwrap_or_default()
}

fn parse_text_instant(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
