// src/lib.rs
// Public library surface for the daemon binary and integration tests.

pub mod config;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod store;
pub mod writer;

// ---- Re-exports for stable public API ----
pub use crate::ingest::types::{FetchOutcome, SourceAdapter};
pub use crate::ingest::{run_cycle, CycleReport};
pub use crate::model::{FieldSummary, NormalizedRecord, RecordBatch, SensorSummary, StoredReading};
pub use crate::store::DocumentStore;
pub use crate::writer::{IncrementalWriter, WriteResult};

use std::sync::Arc;

use crate::config::IngestConfig;
use crate::ingest::http::{HttpClient, Transport};
use crate::ingest::providers::site_sensor::{SiteQuery, SiteSensorAdapter};
use crate::ingest::providers::soap_session::SoapSessionAdapter;
use crate::ingest::providers::timeseries::TimeseriesAdapter;
use crate::notify::Alerter;

/// Build the enabled adapters, in polling order, sharing one HTTP client.
pub fn build_adapters(
    cfg: &IngestConfig,
    alerter: Arc<Alerter>,
) -> anyhow::Result<Vec<Box<dyn SourceAdapter>>> {
    let transport = Transport::Http(HttpClient::new(cfg.http_timeout)?);
    let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();

    let ts = &cfg.sources.timeseries;
    if ts.enabled && !ts.endpoints.is_empty() {
        adapters.push(Box::new(TimeseriesAdapter::new(
            ts.base_url.clone(),
            ts.endpoints.clone(),
            transport.clone(),
        )));
    }

    let site = &cfg.sources.site_sensor;
    if site.enabled && !site.sensors.is_empty() {
        let queries = site
            .sensors
            .iter()
            .map(|s| SiteQuery::new(s.as_str(), site.variable.as_str(), site.last_n_days))
            .collect();
        adapters.push(Box::new(SiteSensorAdapter::new(
            site.base_url.clone(),
            queries,
            transport.clone(),
        )));
    }

    if let Some((soap_cfg, creds)) = &cfg.soap {
        adapters.push(Box::new(
            SoapSessionAdapter::new(soap_cfg.clone(), creds.clone(), transport).with_alerter(alerter),
        ));
    }

    Ok(adapters)
}
