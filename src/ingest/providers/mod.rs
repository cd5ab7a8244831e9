// src/ingest/providers/mod.rs
pub mod site_sensor;
pub mod soap_session;
pub mod timeseries;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse an upstream timestamp into naive UTC wall time.
///
/// Accepts RFC 3339 with an offset (converted to UTC) and offset-less ISO
/// forms, which are taken as UTC already.
pub fn parse_naive_utc(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    Err(anyhow!("unrecognized timestamp {s:?}"))
}

pub fn epoch_ms_to_naive(ms: i64) -> Result<NaiveDateTime> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| anyhow!("epoch ms out of range: {ms}"))
}

/// Numeric reading from a JSON value; upstreams sometimes send numbers as strings.
/// "NaN"/"inf" strings parse as floats but are not readings.
pub(crate) fn json_number(v: &serde_json::Value) -> Option<f64> {
    let n = match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}
