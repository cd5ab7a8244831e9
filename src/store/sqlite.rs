//! SQLite-backed document store (`sqlite://<path>`).
//!
//! Documents are kept as JSON text; field presence and summary merges use
//! SQLite's JSON1 functions so the sparse-column model survives unchanged.

use super::traits::{validate_field, DocumentStore, StoreError, StoreResult};
use crate::model::{FieldSummary, SensorSummary, StoredReading};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub struct SqliteStore {
    // None once closed
    conn: Mutex<Option<Connection>>,
}

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// JSON path addressing a top-level key, quoted so field names with spaces
/// or dots ("Soil Moisture") stay one key.
fn field_path(field: &str) -> StoreResult<String> {
    validate_field(field)?;
    Ok(format!("$.\"{field}\""))
}

fn check_fields(readings: &[StoredReading]) -> StoreResult<()> {
    readings
        .iter()
        .flat_map(|r| r.fields.keys())
        .try_for_each(|k| validate_field(k))
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Create an in-memory store (useful for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            -- Append-only readings; id order is insertion order
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                time TEXT NOT NULL,
                doc_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_readings_name
                ON readings(name, id);

            -- One summary document per entity
            CREATE TABLE IF NOT EXISTS sensors (
                name TEXT PRIMARY KEY,
                doc_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn guard(&self) -> StoreResult<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection mutex poisoned".into()))
    }
}

fn closed() -> StoreError {
    StoreError::Unavailable("sqlite store is closed".into())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn last_reading_time(
        &self,
        entity: &str,
        field: &str,
    ) -> StoreResult<Option<NaiveDateTime>> {
        let path = field_path(field)?;
        let g = self.guard()?;
        let conn = g.as_ref().ok_or_else(closed)?;
        // the time column, not the document: old rows may hold values serde rejects
        let time: Option<String> = conn
            .query_row(
                "SELECT time FROM readings
                 WHERE name = ?1 AND json_type(doc_json, ?2) IS NOT NULL
                 ORDER BY id DESC LIMIT 1",
                params![entity, path],
                |row| row.get(0),
            )
            .optional()?;
        time.map(|t| NaiveDateTime::parse_from_str(&t, TIME_FORMAT))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn upsert_field_summary(
        &self,
        entity: &str,
        field: &str,
        summary: &FieldSummary,
    ) -> StoreResult<()> {
        let path = field_path(field)?;
        let g = self.guard()?;
        let conn = g.as_ref().ok_or_else(closed)?;
        let value = serde_json::to_string(summary)?;
        conn.execute(
            "INSERT INTO sensors (name, doc_json)
             VALUES (?1, json_set(json_object('name', ?1), ?2, json(?3)))
             ON CONFLICT(name) DO UPDATE
             SET doc_json = json_set(sensors.doc_json, ?2, json(?3))",
            params![entity, path, value],
        )?;
        Ok(())
    }

    async fn append_readings(&self, readings: &[StoredReading]) -> StoreResult<usize> {
        check_fields(readings)?;
        let mut g = self.guard()?;
        let conn = g.as_mut().ok_or_else(closed)?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO readings (name, time, doc_json) VALUES (?1, ?2, ?3)")?;
            for r in readings {
                let doc = serde_json::to_string(r)?;
                let time = r.time.format(TIME_FORMAT).to_string();
                stmt.execute(params![r.name, time, doc])?;
            }
        }
        tx.commit()?;
        Ok(readings.len())
    }

    async fn summary(&self, entity: &str) -> StoreResult<Option<SensorSummary>> {
        let g = self.guard()?;
        let conn = g.as_ref().ok_or_else(closed)?;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc_json FROM sensors WHERE name = ?1",
                params![entity],
                |row| row.get(0),
            )
            .optional()?;
        doc.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn readings(&self, entity: &str) -> StoreResult<Vec<StoredReading>> {
        let g = self.guard()?;
        let conn = g.as_ref().ok_or_else(closed)?;
        let mut stmt = conn.prepare("SELECT doc_json FROM readings WHERE name = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![entity], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    async fn close(&self) -> StoreResult<()> {
        let mut g = self.guard()?;
        if let Some(conn) = g.take() {
            conn.close().map_err(|(_, e)| StoreError::Database(e))?;
        }
        Ok(())
    }
}
