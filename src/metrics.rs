use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus recorder with its own HTTP listener on `addr`
/// (scrape `http://<addr>/metrics`). Without it, `metrics` macros are no-ops.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("prometheus: install exporter on {addr}"))?;
    crate::ingest::ensure_metrics_described();
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}
