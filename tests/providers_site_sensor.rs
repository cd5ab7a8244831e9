// tests/providers_site_sensor.rs
use enviro_ingest::ingest::http::Transport;
use enviro_ingest::ingest::providers::parse_naive_utc;
use enviro_ingest::ingest::providers::site_sensor::{SiteQuery, SiteSensorAdapter};
use enviro_ingest::{FetchOutcome, SourceAdapter};

const BASE: &str = "http://sensors.example.test/api/v1.1/sensors/";

#[test]
fn fixture_parses_epoch_ms_and_units() {
    let body = include_str!("fixtures/site_sensor_soil.json");
    let batches = SiteSensorAdapter::parse_payload(body, "Soil Moisture").unwrap();
    assert_eq!(batches.len(), 1);

    let b = &batches[0];
    assert_eq!(b.entity, "PER_EMOTE_101_SOIL");
    assert_eq!(b.field, "Soil Moisture");
    assert_eq!(b.units, "%");
    assert_eq!(
        b.points(),
        &[
            (parse_naive_utc("2024-01-01T00:00:00").unwrap(), 31.0),
            (parse_naive_utc("2024-01-01T00:10:00").unwrap(), 31.5),
            (parse_naive_utc("2024-01-01T00:20:00").unwrap(), 32.25),
        ]
    );
}

#[test]
fn absent_variable_yields_nothing() {
    let body = include_str!("fixtures/site_sensor_soil.json");
    assert!(SiteSensorAdapter::parse_payload(body, "Temperature")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn queries_run_independently() {
    let good = SiteQuery::new("PER_EMOTE_101_SOIL", "Soil Moisture", 3);
    let broken = SiteQuery::new("PER_EMOTE_102_SOIL", "Soil Moisture", 3);
    let other_var = SiteQuery::new("PER_EMOTE_103_SOIL", "Temperature", 3);

    let adapter_urls = SiteSensorAdapter::new(BASE, vec![], Transport::fixtures(Vec::<(String, String)>::new()));
    let transport = Transport::fixtures([
        (adapter_urls.url_for(&broken).unwrap(), "{not json".to_string()),
        (
            adapter_urls.url_for(&other_var).unwrap(),
            include_str!("fixtures/site_sensor_soil.json").to_string(),
        ),
        (
            adapter_urls.url_for(&good).unwrap(),
            include_str!("fixtures/site_sensor_soil.json").to_string(),
        ),
    ]);

    let adapter = SiteSensorAdapter::new(BASE, vec![broken, other_var, good], transport);
    let out = adapter.fetch().await.unwrap();

    assert!(matches!(&out[0], FetchOutcome::Failed { subsource, .. } if subsource == "PER_EMOTE_102_SOIL"));
    assert!(matches!(&out[1], FetchOutcome::Empty { .. }));
    assert!(matches!(&out[2], FetchOutcome::Batch(b) if b.len() == 3));
}
