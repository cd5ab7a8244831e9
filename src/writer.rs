// src/writer.rs
//! Incremental writer: filter a batch against the last stored reading for the
//! same (entity, field), then upsert the summary and append what is new.
//!
//! Re-running with the same upstream payload writes nothing; the filter is
//! timestamp-based, so a cycle interrupted between the summary upsert and the
//! append heals on the next successful run.

use crate::model::{FieldSummary, RecordBatch, StoredReading};
use crate::store::DocumentStore;
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use metrics::counter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct WriteResult {
    /// Records in the incoming batch.
    pub considered: usize,
    /// Records appended to the store.
    pub written: usize,
    /// Last written (time, value), i.e. what the summary now holds.
    pub last: Option<(NaiveDateTime, f64)>,
}

impl WriteResult {
    pub fn is_noop(&self) -> bool {
        self.written == 0
    }
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

pub struct IncrementalWriter {
    store: Arc<dyn DocumentStore>,
    // one lock per (entity, field); keeps writes single-writer when adapters run in parallel
    locks: Mutex<HashMap<(String, String), KeyLock>>,
}

impl IncrementalWriter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn key_lock(&self, entity: &str, field: &str) -> KeyLock {
        let mut map = match self.locks.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.entry((entity.to_string(), field.to_string()))
            .or_default()
            .clone()
    }

    pub async fn write(&self, batch: &RecordBatch) -> Result<WriteResult> {
        let key = self.key_lock(&batch.entity, &batch.field);
        let _held = key.lock().await;

        let last_stored = self
            .store
            .last_reading_time(&batch.entity, &batch.field)
            .await
            .with_context(|| {
                format!("looking up last reading for {}/{}", batch.entity, batch.field)
            })?;

        let fresh = batch.newer_than(last_stored);
        let Some(&(last_time, last_value)) = fresh.last() else {
            tracing::debug!(
                entity = %batch.entity,
                field = %batch.field,
                considered = batch.len(),
                "nothing newer than stored data"
            );
            return Ok(WriteResult {
                considered: batch.len(),
                written: 0,
                last: None,
            });
        };

        let summary = FieldSummary {
            units: batch.units.clone(),
            last_updated: last_time,
            last_value,
        };
        self.store
            .upsert_field_summary(&batch.entity, &batch.field, &summary)
            .await
            .with_context(|| format!("upserting summary for {}", batch.entity))?;

        let docs: Vec<StoredReading> = fresh
            .iter()
            .map(|(t, v)| StoredReading::single(&batch.entity, *t, &batch.field, *v))
            .collect();
        let written = self
            .store
            .append_readings(&docs)
            .await
            .with_context(|| format!("appending readings for {}", batch.entity))?;

        counter!("ingest_records_written_total").increment(written as u64);
        counter!("ingest_batches_written_total").increment(1);
        tracing::info!(
            entity = %batch.entity,
            field = %batch.field,
            written,
            last_updated = %last_time,
            last_value,
            "wrote new readings"
        );

        Ok(WriteResult {
            considered: batch.len(),
            written,
            last: Some((last_time, last_value)),
        })
    }
}
