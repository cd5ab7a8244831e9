//! In-process store backend (`memory://`). Used by tests and dry runs.

use super::traits::{validate_field, DocumentStore, StoreError, StoreResult};
use crate::model::{FieldSummary, SensorSummary, StoredReading};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    readings: Vec<StoredReading>,
    sensors: HashMap<String, SensorSummary>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    write_ops: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call returns `StoreError::Unavailable` while set.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Number of mutating calls (summary upserts + append calls) that succeeded.
    pub fn write_ops(&self) -> usize {
        self.write_ops.load(Ordering::SeqCst)
    }

    pub fn reading_count(&self) -> usize {
        self.lock().map(|g| g.readings.len()).unwrap_or(0)
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked down".into()));
        }
        Ok(())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".into()))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn last_reading_time(
        &self,
        entity: &str,
        field: &str,
    ) -> StoreResult<Option<NaiveDateTime>> {
        self.check()?;
        validate_field(field)?;
        let g = self.lock()?;
        Ok(g.readings
            .iter()
            .rev()
            .find(|r| r.name == entity && r.has_field(field))
            .map(|r| r.time))
    }

    async fn upsert_field_summary(
        &self,
        entity: &str,
        field: &str,
        summary: &FieldSummary,
    ) -> StoreResult<()> {
        self.check()?;
        validate_field(field)?;
        let mut g = self.lock()?;
        let doc = g
            .sensors
            .entry(entity.to_string())
            .or_insert_with(|| SensorSummary {
                name: entity.to_string(),
                ..Default::default()
            });
        doc.fields.insert(field.to_string(), summary.clone());
        self.write_ops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn append_readings(&self, readings: &[StoredReading]) -> StoreResult<usize> {
        self.check()?;
        for r in readings {
            r.fields.keys().try_for_each(|k| validate_field(k))?;
        }
        let mut g = self.lock()?;
        g.readings.extend_from_slice(readings);
        self.write_ops.fetch_add(1, Ordering::SeqCst);
        Ok(readings.len())
    }

    async fn summary(&self, entity: &str) -> StoreResult<Option<SensorSummary>> {
        self.check()?;
        Ok(self.lock()?.sensors.get(entity).cloned())
    }

    async fn readings(&self, entity: &str) -> StoreResult<Vec<StoredReading>> {
        self.check()?;
        Ok(self
            .lock()?
            .readings
            .iter()
            .filter(|r| r.name == entity)
            .cloned()
            .collect())
    }
}
