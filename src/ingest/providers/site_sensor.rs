// src/ingest/providers/site_sensor.rs
//! Adapter B: per-site sensor API, one fixed-window query per sensor.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use reqwest::Url;
use serde_json::Value;

use super::{epoch_ms_to_naive, json_number};
use crate::ingest::http::Transport;
use crate::ingest::types::{FetchOutcome, SourceAdapter};
use crate::model::RecordBatch;

pub const DEFAULT_BASE_URL: &str = "http://uoweb3.ncl.ac.uk/api/v1.1/sensors/";
pub const DEFAULT_VARIABLE: &str = "Soil Moisture";
pub const DEFAULT_WINDOW_DAYS: u32 = 3;

pub const DEFAULT_SENSORS: &[&str] = &[
    "PER_EMOTE_101_SOIL",
    "PER_EMOTE_102_SOIL",
    "PER_EMOTE_103_SOIL",
    "PER_EMOTE_104_SOIL",
    "PER_EMOTE_105_SOIL",
];

#[derive(Debug, Clone, PartialEq)]
pub struct SiteQuery {
    pub sensor: String,
    pub variable: String,
    pub last_n_days: u32,
}

impl SiteQuery {
    pub fn new(sensor: impl Into<String>, variable: impl Into<String>, last_n_days: u32) -> Self {
        Self {
            sensor: sensor.into(),
            variable: variable.into(),
            last_n_days,
        }
    }

    /// `<base><sensor>/data/json/?last_n_days=..&data_variable=..`, with the
    /// sensor path segment and the query values encoded by `Url`.
    pub fn url(&self, base_url: &str) -> Result<Url> {
        let raw = format!("{base_url}{}/data/json/", self.sensor);
        Url::parse_with_params(
            &raw,
            &[
                ("last_n_days", self.last_n_days.to_string()),
                ("data_variable", self.variable.clone()),
            ],
        )
        .with_context(|| format!("building query url for {}", self.sensor))
    }
}

/// "Sensor Name" comes either as a plain string or as a one-entry `{"0": "..."}` map.
fn sensor_name(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(m) => m.values().find_map(|x| x.as_str().map(str::to_string)),
        _ => None,
    }
}

fn sensor_list(root: &Value) -> Result<Vec<&Value>> {
    match root {
        Value::Object(m) => match m.get("sensors") {
            Some(Value::Array(a)) => Ok(a.iter().collect()),
            Some(other) => Err(anyhow!("unexpected `sensors` shape: {other}")),
            // a single sensor object at the root
            None if m.contains_key("data") => Ok(vec![root]),
            None => Ok(m.values().filter(|v| v.get("data").is_some()).collect()),
        },
        Value::Array(a) => Ok(a.iter().collect()),
        _ => Err(anyhow!("unexpected payload root")),
    }
}

pub struct SiteSensorAdapter {
    base_url: String,
    queries: Vec<SiteQuery>,
    transport: Transport,
}

impl SiteSensorAdapter {
    pub fn new(base_url: impl Into<String>, queries: Vec<SiteQuery>, transport: Transport) -> Self {
        Self {
            base_url: base_url.into(),
            queries,
            transport,
        }
    }

    pub fn url_for(&self, q: &SiteQuery) -> Result<String> {
        Ok(q.url(&self.base_url)?.to_string())
    }

    /// One batch per sensor in the payload that reported `variable`.
    /// An empty vec means the variable was absent or had no samples.
    pub fn parse_payload(body: &str, variable: &str) -> Result<Vec<RecordBatch>> {
        let root: Value = serde_json::from_str(body).context("parsing site sensor json")?;
        let mut out = Vec::new();

        for sensor in sensor_list(&root)? {
            let Some(samples) = sensor
                .get("data")
                .and_then(|d| d.get(variable))
                .and_then(Value::as_array)
            else {
                continue;
            };
            if samples.is_empty() {
                continue;
            }
            let Some(entity) = sensor.get("Sensor Name").and_then(sensor_name) else {
                tracing::warn!(variable, samples = samples.len(), "sensor without `Sensor Name`; skipped");
                continue;
            };
            let units = samples
                .iter()
                .find_map(|s| s.get("Units").and_then(Value::as_str))
                .unwrap_or_default()
                .to_string();

            let mut points = Vec::with_capacity(samples.len());
            for s in samples {
                let ms = s
                    .get("Timestamp")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| anyhow!("sample without epoch-ms `Timestamp`"))?;
                let Some(value) = s.get("Value").and_then(json_number) else {
                    continue;
                };
                points.push((epoch_ms_to_naive(ms)?, value));
            }
            if !points.is_empty() {
                out.push(RecordBatch::new(entity, variable, units, points));
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for SiteSensorAdapter {
    async fn fetch(&self) -> Result<Vec<FetchOutcome>> {
        let mut out = Vec::with_capacity(self.queries.len());
        for q in &self.queries {
            let parsed = match self.url_for(q) {
                Ok(url) => match self.transport.get_text(&url).await {
                    Ok(body) => Self::parse_payload(&body, &q.variable),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            match parsed {
                Ok(batches) if batches.is_empty() => {
                    tracing::debug!(sensor = %q.sensor, variable = %q.variable, "no samples");
                    out.push(FetchOutcome::empty(q.sensor.as_str()));
                }
                Ok(batches) => {
                    for b in batches {
                        counter!("ingest_records_fetched_total").increment(b.len() as u64);
                        out.push(FetchOutcome::Batch(b));
                    }
                }
                Err(e) => {
                    tracing::warn!(error = ?e, provider = "site_sensor", sensor = %q.sensor, "query failed");
                    counter!("ingest_subsource_failures_total").increment(1);
                    out.push(FetchOutcome::failed(q.sensor.as_str(), format!("{e:#}")));
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "site_sensor"
    }
}
