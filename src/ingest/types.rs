// src/ingest/types.rs
use crate::model::RecordBatch;
use anyhow::Result;

/// Result of polling one sub-source (one endpoint or sensor id) of an adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// New (or possibly already stored) data for one (entity, field).
    Batch(RecordBatch),
    /// Upstream answered but had nothing for us (empty list, variable absent).
    Empty { subsource: String },
    /// Transient failure of this sub-source only; the rest of the adapter continues.
    Failed { subsource: String, reason: String },
}

impl FetchOutcome {
    pub fn failed(subsource: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            subsource: subsource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn empty(subsource: impl Into<String>) -> Self {
        Self::Empty {
            subsource: subsource.into(),
        }
    }
}

/// One upstream API family. `fetch` walks every configured sub-source in order.
///
/// An `Err` means the whole adapter is unusable this cycle (e.g. login failed);
/// per-endpoint problems are reported as `FetchOutcome::Failed` instead.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self) -> Result<Vec<FetchOutcome>>;
    fn name(&self) -> &'static str;
}
