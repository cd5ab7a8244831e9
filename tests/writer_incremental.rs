// tests/writer_incremental.rs
use chrono::{NaiveDate, NaiveDateTime};
use enviro_ingest::store::{DocumentStore, MemoryStore, SqliteStore};
use enviro_ingest::{IncrementalWriter, RecordBatch, StoredReading};
use std::sync::Arc;

fn at(m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, m, 0)
        .unwrap()
}

fn rainfall(points: Vec<(NaiveDateTime, f64)>) -> RecordBatch {
    RecordBatch::new("Automatic Weather Station", "rainfall", "mm", points)
}

async fn seed_last_time(store: &dyn DocumentStore, m: u32) {
    store
        .append_readings(&[StoredReading::single(
            "Automatic Weather Station",
            at(m),
            "rainfall",
            2.0,
        )])
        .await
        .unwrap();
}

async fn partial_overlap_scenario(store: Arc<dyn DocumentStore>) {
    seed_last_time(store.as_ref(), 10).await;
    let w = IncrementalWriter::new(store.clone());

    let batch = rainfall(vec![
        (at(5), 1.0),
        (at(10), 2.0),
        (at(15), 3.0),
        (at(20), 4.0),
    ]);
    let res = w.write(&batch).await.unwrap();
    assert_eq!(res.considered, 4);
    assert_eq!(res.written, 2);
    assert_eq!(res.last, Some((at(20), 4.0)));

    let stored = store.readings("Automatic Weather Station").await.unwrap();
    let new: Vec<_> = stored[1..]
        .iter()
        .map(|r| (r.time, r.fields["rainfall"]))
        .collect();
    assert_eq!(new, vec![(at(15), 3.0), (at(20), 4.0)]);

    let summary = store
        .summary("Automatic Weather Station")
        .await
        .unwrap()
        .expect("summary created");
    let f = summary.field("rainfall").unwrap();
    assert_eq!(f.last_updated, at(20));
    assert_eq!(f.last_value, 4.0);
    assert_eq!(f.units, "mm");
}

#[tokio::test]
async fn only_strictly_newer_records_are_stored_memory() {
    partial_overlap_scenario(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn only_strictly_newer_records_are_stored_sqlite() {
    partial_overlap_scenario(Arc::new(SqliteStore::open_in_memory().unwrap())).await;
}

#[tokio::test]
async fn replaying_the_same_batch_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let w = IncrementalWriter::new(store.clone());
    let batch = rainfall(vec![(at(5), 1.0), (at(10), 2.0), (at(15), 3.0)]);

    let first = w.write(&batch).await.unwrap();
    assert_eq!(first.written, 3);
    let ops_after_first = store.write_ops();

    let second = w.write(&batch).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(store.reading_count(), 3);
    assert_eq!(store.write_ops(), ops_after_first);
}

#[tokio::test]
async fn batch_at_or_before_last_time_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    seed_last_time(store.as_ref(), 10).await;
    let ops = store.write_ops();
    let w = IncrementalWriter::new(store.clone());

    let res = w
        .write(&rainfall(vec![(at(1), 0.5), (at(10), 2.0)]))
        .await
        .unwrap();
    assert!(res.is_noop());
    assert_eq!(store.write_ops(), ops);
    assert!(store
        .summary("Automatic Weather Station")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn summary_reflects_filtered_batch_not_raw_batch() {
    let store = Arc::new(MemoryStore::new());
    let w = IncrementalWriter::new(store.clone());
    w.write(&rainfall(vec![(at(30), 9.0)])).await.unwrap();

    // newest raw record is older than what is stored; the writer must ignore it
    let res = w
        .write(&rainfall(vec![(at(20), 4.0), (at(25), 5.0)]))
        .await
        .unwrap();
    assert!(res.is_noop());

    let s = store.summary("Automatic Weather Station").await.unwrap().unwrap();
    assert_eq!(s.field("rainfall").unwrap().last_value, 9.0);
    assert_eq!(s.field("rainfall").unwrap().last_updated, at(30));
}

#[tokio::test]
async fn writes_preserve_time_order() {
    let store = Arc::new(MemoryStore::new());
    let w = IncrementalWriter::new(store.clone());
    w.write(&rainfall(vec![(at(20), 4.0), (at(5), 1.0), (at(15), 3.0)]))
        .await
        .unwrap();

    let times: Vec<_> = store
        .readings("Automatic Weather Station")
        .await
        .unwrap()
        .iter()
        .map(|r| r.time)
        .collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(times, vec![at(5), at(15), at(20)]);
}

#[tokio::test]
async fn dedup_is_scoped_per_field() {
    let store = Arc::new(MemoryStore::new());
    let w = IncrementalWriter::new(store.clone());
    w.write(&rainfall(vec![(at(30), 9.0)])).await.unwrap();

    // same entity, other field, older timestamps: must still be written
    let level = RecordBatch::new(
        "Automatic Weather Station",
        "level",
        "m",
        vec![(at(5), 0.4), (at(10), 0.5)],
    );
    let res = w.write(&level).await.unwrap();
    assert_eq!(res.written, 2);

    let s = store.summary("Automatic Weather Station").await.unwrap().unwrap();
    assert_eq!(s.fields.len(), 2);
    assert_eq!(s.field("rainfall").unwrap().last_value, 9.0);
    assert_eq!(s.field("level").unwrap().units, "m");
}

#[tokio::test]
async fn parallel_writers_on_same_key_do_not_duplicate() {
    let store = Arc::new(MemoryStore::new());
    let w = Arc::new(IncrementalWriter::new(store.clone()));
    let batch = rainfall(vec![(at(5), 1.0), (at(10), 2.0)]);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let w = w.clone();
        let b = batch.clone();
        handles.push(tokio::spawn(async move { w.write(&b).await.unwrap().written }));
    }
    let mut total = 0;
    for h in handles {
        total += h.await.unwrap();
    }
    assert_eq!(total, 2);
    assert_eq!(store.reading_count(), 2);
}

#[tokio::test]
async fn nan_sample_does_not_poison_later_cycles_sqlite() {
    use enviro_ingest::ingest::providers::timeseries::TimeseriesAdapter;

    let payload = |values: &str| {
        format!(
            r#"{{"timeseries":{{"unit":{{"name":"Millimetres"}},
                "parentFeed":{{"metric":"rain","parentEntity":{{"name":"AWS"}}}}}},
               "historic":{{"values":[{values}]}}}}"#
        )
    };
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let w = IncrementalWriter::new(store.clone());

    let first = TimeseriesAdapter::parse_payload(&payload(
        r#"{"time":"2024-01-01T00:05:00Z","value":"NaN"},
           {"time":"2024-01-01T00:10:00Z","value":"2"}"#,
    ))
    .unwrap()
    .expect("one finite sample");
    assert_eq!(first.points(), &[(at(10), 2.0)]);
    assert_eq!(w.write(&first).await.unwrap().written, 1);

    let next = TimeseriesAdapter::parse_payload(&payload(
        r#"{"time":"2024-01-01T00:15:00Z","value":3},
           {"time":"2024-01-01T00:20:00Z","value":"inf"}"#,
    ))
    .unwrap()
    .expect("one finite sample");
    let res = w.write(&next).await.unwrap();
    assert_eq!(res.written, 1);
    assert_eq!(res.last, Some((at(15), 3.0)));

    let stored = store.readings("AWS").await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(
        store.summary("AWS").await.unwrap().unwrap().field("rain").unwrap().last_value,
        3.0
    );
}

#[tokio::test]
async fn reserved_field_name_is_refused_before_writing() {
    let store = Arc::new(MemoryStore::new());
    let w = IncrementalWriter::new(store.clone());
    let batch = RecordBatch::new("AWS", "time", "s", vec![(at(5), 1.0)]);

    assert!(w.write(&batch).await.is_err());
    assert_eq!(store.reading_count(), 0);
    assert_eq!(store.write_ops(), 0);
}
