//! Document store contract used by the incremental writer.

use crate::model::{FieldSummary, SensorSummary, StoredReading};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unsupported store URI: {0}")]
    UnsupportedUri(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Invalid field name {0:?}")]
    InvalidField(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Keys every reading/summary document already uses.
pub const RESERVED_FIELDS: &[&str] = &["name", "time"];

/// Field names become top-level document keys, so they must not shadow
/// `name`/`time` and must be addressable as a quoted JSON path label.
pub fn validate_field(field: &str) -> StoreResult<()> {
    if field.trim().is_empty() || field.contains('"') || RESERVED_FIELDS.contains(&field) {
        return Err(StoreError::InvalidField(field.to_string()));
    }
    Ok(())
}

/// Key/value + append-log document store.
///
/// Every method taking a field name rejects it with `InvalidField` unless it
/// passes [`validate_field`].
///
/// Two collections: `readings` (append-only, sparse field columns) and
/// `sensors` (one summary document per entity, merged in place).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Time of the most recently inserted reading for `entity` that carries `field`.
    async fn last_reading_time(
        &self,
        entity: &str,
        field: &str,
    ) -> StoreResult<Option<NaiveDateTime>>;

    /// Create the summary document for `entity` if absent, then set
    /// `field.{units,last_updated,last_value}` without touching other fields.
    async fn upsert_field_summary(
        &self,
        entity: &str,
        field: &str,
        summary: &FieldSummary,
    ) -> StoreResult<()>;

    /// Append readings in the given order. Returns the number inserted.
    async fn append_readings(&self, readings: &[StoredReading]) -> StoreResult<usize>;

    async fn summary(&self, entity: &str) -> StoreResult<Option<SensorSummary>>;

    /// All readings of `entity`, in insertion order.
    async fn readings(&self, entity: &str) -> StoreResult<Vec<StoredReading>>;

    /// Release the underlying connection. Further calls may fail.
    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_that_break_documents_are_rejected() {
        for bad in ["name", "time", "", "  ", "level \"raw\""] {
            assert!(
                matches!(validate_field(bad), Err(StoreError::InvalidField(_))),
                "{bad:?}"
            );
        }
        for ok in ["Soil Moisture", "rainfall.tbr2", "sensor_1001", "Name"] {
            assert!(validate_field(ok).is_ok(), "{ok:?}");
        }
    }
}
