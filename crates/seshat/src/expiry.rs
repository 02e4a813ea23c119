//! Expiry computation for session payloads.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Compute the expiry for a session payload, in whole Unix seconds.
///
/// An explicit expiry embedded in the payload's `cookie` sub-object wins,
/// checking `cookie.expires` then `cookie._expires` (first field present is
/// used). The value may be an epoch-milliseconds number or an RFC 3339
/// timestamp string. Without an explicit expiry, or when the embedded value
/// does not parse, the expiry is `now + default_ttl_ms`.
///
/// Millisecond precision is dropped by rounding, matching the stored
/// column's second granularity.
pub fn session_expiry(data: &Value, default_ttl_ms: u64, now: DateTime<Utc>) -> i64 {
    let explicit = data
        .get("cookie")
        .and_then(|cookie| cookie.get("expires").or_else(|| cookie.get("_expires")))
        .and_then(timestamp_millis);

    let millis = explicit.unwrap_or_else(|| now.timestamp_millis() + default_ttl_ms as i64);
    (millis as f64 / 1000.0).round() as i64
}

/// Interpret a JSON value as an epoch-milliseconds timestamp.
fn timestamp_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}
