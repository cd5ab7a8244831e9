// src/ingest/mod.rs
pub mod http;
pub mod providers;
pub mod scheduler;
pub mod types;

use crate::ingest::types::{FetchOutcome, SourceAdapter};
use crate::writer::IncrementalWriter;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_cycles_total", "Completed poll cycles.");
        describe_counter!(
            "ingest_records_fetched_total",
            "Records parsed from upstream payloads (before dedup)."
        );
        describe_counter!(
            "ingest_records_written_total",
            "Readings appended to the store."
        );
        describe_counter!(
            "ingest_batches_written_total",
            "Non-empty (entity, field) batches written."
        );
        describe_counter!(
            "ingest_subsource_failures_total",
            "Endpoint/sensor fetches skipped this cycle."
        );
        describe_counter!(
            "ingest_adapter_errors_total",
            "Whole-adapter failures (e.g. login)."
        );
        describe_counter!("ingest_write_errors_total", "Store errors on the write path.");
        describe_histogram!("ingest_parse_ms", "Payload parse time in milliseconds.");
        describe_histogram!("ingest_cycle_ms", "Poll cycle wall time in milliseconds.");
        describe_gauge!("ingest_last_cycle_ts", "Unix ts when the last cycle finished.");
    });
}

/// What one cycle did. Counts are per sub-source / batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub adapters_run: usize,
    pub adapters_failed: usize,
    pub subsources_empty: usize,
    pub subsources_failed: usize,
    pub batches_written: usize,
    pub records_written: usize,
    pub write_errors: usize,
}

impl CycleReport {
    fn merge(&mut self, other: CycleReport) {
        self.adapters_run += other.adapters_run;
        self.adapters_failed += other.adapters_failed;
        self.subsources_empty += other.subsources_empty;
        self.subsources_failed += other.subsources_failed;
        self.batches_written += other.batches_written;
        self.records_written += other.records_written;
        self.write_errors += other.write_errors;
    }
}

/// Run one adapter and hand its batches to the writer. Never fails: every
/// error is logged and counted in the report.
pub async fn run_adapter(adapter: &dyn SourceAdapter, writer: &IncrementalWriter) -> CycleReport {
    let mut report = CycleReport {
        adapters_run: 1,
        ..Default::default()
    };

    let outcomes = match adapter.fetch().await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = ?e, adapter = adapter.name(), "adapter failed; skipping this cycle");
            counter!("ingest_adapter_errors_total").increment(1);
            report.adapters_failed = 1;
            return report;
        }
    };

    for outcome in outcomes {
        match outcome {
            FetchOutcome::Batch(batch) => match writer.write(&batch).await {
                Ok(res) if res.is_noop() => {}
                Ok(res) => {
                    report.batches_written += 1;
                    report.records_written += res.written;
                }
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        adapter = adapter.name(),
                        entity = %batch.entity,
                        field = %batch.field,
                        "write failed"
                    );
                    counter!("ingest_write_errors_total").increment(1);
                    report.write_errors += 1;
                }
            },
            FetchOutcome::Empty { .. } => report.subsources_empty += 1,
            FetchOutcome::Failed { subsource, reason } => {
                tracing::debug!(adapter = adapter.name(), %subsource, %reason, "sub-source skipped");
                report.subsources_failed += 1;
            }
        }
    }
    report
}

/// Run every adapter once, in order. `parallel` runs them concurrently;
/// writes stay serialized per (entity, field) inside the writer.
pub async fn run_cycle(
    adapters: &[Box<dyn SourceAdapter>],
    writer: &IncrementalWriter,
    parallel: bool,
) -> CycleReport {
    ensure_metrics_described();
    let t0 = std::time::Instant::now();

    let mut report = CycleReport::default();
    if parallel {
        let runs = adapters.iter().map(|a| run_adapter(a.as_ref(), writer));
        for r in futures::future::join_all(runs).await {
            report.merge(r);
        }
    } else {
        for a in adapters {
            report.merge(run_adapter(a.as_ref(), writer).await);
        }
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_cycle_ms").record(ms);
    counter!("ingest_cycles_total").increment(1);
    gauge!("ingest_last_cycle_ts").set(chrono::Utc::now().timestamp() as f64);

    tracing::info!(
        target: "ingest",
        adapters = report.adapters_run,
        adapters_failed = report.adapters_failed,
        batches = report.batches_written,
        records = report.records_written,
        failed_subsources = report.subsources_failed,
        write_errors = report.write_errors,
        elapsed_ms = ms as u64,
        "poll cycle done"
    );
    report
}
