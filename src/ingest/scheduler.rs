// src/ingest/scheduler.rs
use crate::ingest::types::SourceAdapter;
use crate::ingest::{run_cycle, CycleReport};
use crate::writer::IncrementalWriter;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

#[derive(Clone, Copy, Debug)]
pub struct PollSchedulerCfg {
    /// Target time between cycle *starts*.
    pub interval: Duration,
    /// Run adapters concurrently within a cycle.
    pub parallel: bool,
}

/// Runs every adapter once per tick until shutdown. Stateless between cycles;
/// everything it needs to resume is in the store.
pub struct PollScheduler {
    cfg: PollSchedulerCfg,
    adapters: Vec<Box<dyn SourceAdapter>>,
    writer: Arc<IncrementalWriter>,
}

impl PollScheduler {
    pub fn new(
        cfg: PollSchedulerCfg,
        adapters: Vec<Box<dyn SourceAdapter>>,
        writer: Arc<IncrementalWriter>,
    ) -> Self {
        Self {
            cfg,
            adapters,
            writer,
        }
    }

    pub async fn run_once(&self) -> CycleReport {
        run_cycle(&self.adapters, &self.writer, self.cfg.parallel).await
    }

    /// Poll until `shutdown` resolves. The first cycle starts immediately.
    /// A cycle that overruns the interval delays the next one rather than
    /// bunching ticks. Shutdown is only observed between cycles.
    pub async fn run<S>(self, shutdown: S) -> usize
    where
        S: Future<Output = ()>,
    {
        let mut ticker = time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            interval_secs = self.cfg.interval.as_secs(),
            adapters = self.adapters.len(),
            parallel = self.cfg.parallel,
            "poll scheduler started"
        );

        let mut cycles = 0usize;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(cycles, "poll scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_once().await;
                    cycles += 1;
                }
            }
        }
        cycles
    }

    pub fn spawn<S>(self, shutdown: S) -> JoinHandle<usize>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run(shutdown))
    }
}
