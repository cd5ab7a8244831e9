//! Document store backends.
//!
//! The writer talks to a `DocumentStore` trait object opened once at startup.
//! `SqliteStore` is the persistent backend; `MemoryStore` serves tests.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{validate_field, DocumentStore, StoreError, StoreResult};

use std::sync::Arc;

/// Open a store from a connection URI:
/// - `memory://`
/// - `sqlite::memory:`
/// - `sqlite://<path>` (relative or absolute)
pub fn open(uri: &str) -> StoreResult<Arc<dyn DocumentStore>> {
    let uri = uri.trim();
    if uri == "memory://" || uri == "memory" {
        return Ok(Arc::new(MemoryStore::new()));
    }
    if uri == "sqlite::memory:" {
        return Ok(Arc::new(SqliteStore::open_in_memory()?));
    }
    if let Some(path) = uri.strip_prefix("sqlite://") {
        if path.is_empty() {
            return Err(StoreError::UnsupportedUri(uri.to_string()));
        }
        return Ok(Arc::new(SqliteStore::open(path)?));
    }
    Err(StoreError::UnsupportedUri(uri.to_string()))
}

/// URI safe to log: drops any `user:password@` part.
pub fn redact_uri(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &uri[..scheme_end], &uri[at + 1..])
        }
        _ => uri.to_string(),
    }
}
