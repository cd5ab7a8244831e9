// tests/providers_timeseries.rs
use enviro_ingest::ingest::http::Transport;
use enviro_ingest::ingest::providers::parse_naive_utc;
use enviro_ingest::ingest::providers::timeseries::TimeseriesAdapter;
use enviro_ingest::{FetchOutcome, SourceAdapter};

const BASE: &str = "https://api.example.test/timeseries/";

#[test]
fn fixture_parses_into_sorted_batch() {
    let body = include_str!("fixtures/timeseries_rainfall.json");
    let batch = TimeseriesAdapter::parse_payload(body)
        .expect("valid payload")
        .expect("non-empty");

    assert_eq!(batch.entity, "Automatic Weather Station");
    assert_eq!(batch.field, "Rainfall Accumulation (TBR2)");
    assert_eq!(batch.units, "Millimetres");
    let values: Vec<f64> = batch.points().iter().map(|(_, v)| *v).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(
        batch.last().unwrap().0,
        parse_naive_utc("2024-01-01T00:20:00").unwrap()
    );
}

#[test]
fn empty_value_list_is_not_an_error() {
    let body = include_str!("fixtures/timeseries_empty.json");
    assert!(TimeseriesAdapter::parse_payload(body).unwrap().is_none());
}

#[test]
fn html_error_page_is_malformed() {
    assert!(TimeseriesAdapter::parse_payload("<html>502 Bad Gateway</html>").is_err());
}

#[tokio::test]
async fn one_bad_endpoint_does_not_abort_the_rest() {
    let transport = Transport::fixtures([
        (format!("{BASE}a/raw/historic"), "<html>oops</html>".to_string()),
        (
            format!("{BASE}b/raw/historic"),
            include_str!("fixtures/timeseries_empty.json").to_string(),
        ),
        (
            format!("{BASE}c/raw/historic"),
            include_str!("fixtures/timeseries_rainfall.json").to_string(),
        ),
    ]);
    let adapter = TimeseriesAdapter::new(
        BASE,
        vec![
            "a/raw/historic".into(),
            "missing/raw/historic".into(),
            "b/raw/historic".into(),
            "c/raw/historic".into(),
        ],
        transport,
    );

    let out = adapter.fetch().await.expect("adapter itself never fails");
    assert_eq!(out.len(), 4);
    assert!(matches!(&out[0], FetchOutcome::Failed { subsource, .. } if subsource == "a/raw/historic"));
    assert!(matches!(&out[1], FetchOutcome::Failed { .. }));
    assert!(matches!(&out[2], FetchOutcome::Empty { .. }));
    match &out[3] {
        FetchOutcome::Batch(b) => assert_eq!(b.len(), 4),
        other => panic!("expected batch, got {other:?}"),
    }
}
