//! enviro-ingest daemon entrypoint.
//! Loads config, opens the store once, and polls every source on a fixed
//! cadence until SIGINT/ctrl-c.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use enviro_ingest::config::IngestConfig;
use enviro_ingest::ingest::scheduler::{PollScheduler, PollSchedulerCfg};
use enviro_ingest::notify::{Alerter, NotifierMux};
use enviro_ingest::{build_adapters, store, IncrementalWriter};

/// Timestamped logs to stdout; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("enviro_ingest=info,ingest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    // Bad config (e.g. SOAP credentials missing) must stop us before any polling.
    let cfg = IngestConfig::from_env().context("loading configuration")?;

    if let Some(addr) = cfg.metrics_addr {
        enviro_ingest::metrics::install_exporter(addr)?;
    }

    let doc_store = store::open(&cfg.store_uri)
        .with_context(|| format!("opening store {}", store::redact_uri(&cfg.store_uri)))?;
    tracing::info!(store = %store::redact_uri(&cfg.store_uri), "store opened");

    let alerter = Arc::new(Alerter::new(NotifierMux::from_env(), cfg.alert_cooldown_secs));
    let adapters = build_adapters(&cfg, alerter)?;
    let writer = Arc::new(IncrementalWriter::new(doc_store.clone()));

    let scheduler = PollScheduler::new(
        PollSchedulerCfg {
            interval: cfg.poll_interval,
            parallel: cfg.parallel,
        },
        adapters,
        writer,
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = ?e, "ctrl-c handler failed; running until killed");
            std::future::pending::<()>().await;
        }
    };
    let cycles = scheduler.run(shutdown).await;

    doc_store.close().await.context("closing store")?;
    tracing::info!(cycles, "stopped");
    Ok(())
}
