// src/ingest/providers/timeseries.rs
//! Adapter A: historic time-series API (one JSON document per endpoint path).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;

use super::{json_number, parse_naive_utc};
use crate::ingest::http::Transport;
use crate::ingest::types::{FetchOutcome, SourceAdapter};
use crate::model::RecordBatch;

pub const DEFAULT_BASE_URL: &str =
    "https://api.usb.urbanobservatory.ac.uk/api/v2/sensors/timeseries/";

pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "automatic-weather-station/rainfall-accumulation-(tbr2)/raw/historic",
    "automatic-weather-station/rainfall-rate-(tbr2)/raw/historic",
    "automatic-weather-station/rainfall-rate-(tbr1)/raw/historic",
    "automatic-weather-station/rainfall-accumulation-(tbr1)/raw/historic",
    "plant-room-1/rwht-ultrasonic-level-sensor/raw/historic",
];

#[derive(Debug, Deserialize)]
struct Payload {
    timeseries: Option<Timeseries>,
    historic: Historic,
}

#[derive(Debug, Deserialize)]
struct Timeseries {
    unit: Unit,
    #[serde(rename = "parentFeed")]
    parent_feed: ParentFeed,
}

#[derive(Debug, Deserialize)]
struct Unit {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ParentFeed {
    metric: String,
    #[serde(rename = "parentEntity")]
    parent_entity: ParentEntity,
}

#[derive(Debug, Deserialize)]
struct ParentEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Historic {
    #[serde(default)]
    values: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct Point {
    time: String,
    #[serde(default)]
    value: serde_json::Value,
}

pub struct TimeseriesAdapter {
    base_url: String,
    endpoints: Vec<String>,
    transport: Transport,
}

impl TimeseriesAdapter {
    pub fn new(base_url: impl Into<String>, endpoints: Vec<String>, transport: Transport) -> Self {
        Self {
            base_url: base_url.into(),
            endpoints,
            transport,
        }
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Parse one endpoint's body. `Ok(None)` when the value list is empty.
    pub fn parse_payload(body: &str) -> Result<Option<RecordBatch>> {
        let t0 = std::time::Instant::now();
        let payload: Payload = serde_json::from_str(body).context("parsing timeseries json")?;

        if payload.historic.values.is_empty() {
            return Ok(None);
        }
        let ts = payload
            .timeseries
            .ok_or_else(|| anyhow!("timeseries metadata missing"))?;

        let mut points = Vec::with_capacity(payload.historic.values.len());
        for p in payload.historic.values {
            let time = parse_naive_utc(&p.time)?;
            // null / non-numeric samples carry no reading
            let Some(value) = json_number(&p.value) else {
                continue;
            };
            points.push((time, value));
        }
        if points.is_empty() {
            return Ok(None);
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);

        Ok(Some(RecordBatch::new(
            ts.parent_feed.parent_entity.name,
            ts.parent_feed.metric,
            ts.unit.name,
            points,
        )))
    }
}

#[async_trait]
impl SourceAdapter for TimeseriesAdapter {
    async fn fetch(&self) -> Result<Vec<FetchOutcome>> {
        let mut out = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            let url = self.url_for(endpoint);
            let body = match self.transport.get_text(&url).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::warn!(error = ?e, provider = "timeseries", %endpoint, "endpoint fetch failed");
                    counter!("ingest_subsource_failures_total").increment(1);
                    out.push(FetchOutcome::failed(endpoint.as_str(), format!("{e:#}")));
                    continue;
                }
            };
            match Self::parse_payload(&body) {
                Ok(Some(batch)) => {
                    counter!("ingest_records_fetched_total").increment(batch.len() as u64);
                    out.push(FetchOutcome::Batch(batch));
                }
                Ok(None) => out.push(FetchOutcome::empty(endpoint.as_str())),
                Err(e) => {
                    tracing::warn!(error = ?e, provider = "timeseries", %endpoint, "malformed payload");
                    counter!("ingest_subsource_failures_total").increment(1);
                    out.push(FetchOutcome::failed(endpoint.as_str(), format!("{e:#}")));
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "timeseries"
    }
}
