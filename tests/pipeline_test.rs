use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use datespot_aggregator::app::{
    CategorizationItem, CategorizerPort, EventSourcePort, GeocoderPort, WeatherPort,
};
use datespot_aggregator::config::PipelineConfig;
use datespot_aggregator::error::PortError;
use datespot_aggregator::infra::InMemoryPublisher;
use datespot_aggregator::pipeline::{Collaborators, Orchestrator, StageName, StageOutcome};
use datespot_aggregator::types::{Coordinates, RawEvent, WeatherSummary};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
}

fn listing(id: u64, title: &str, venue: &str, start: &str) -> RawEvent {
    json!({
        "id": id,
        "title": title,
        "venue_name": venue,
        "start_time": start,
        "end_time": "11:00 PM",
        "description_stripped": format!("{title} at {venue}"),
        "share_url": format!("https://www.blogto.com/events/{id}/"),
        "hub_page_image_url": format!("https://media.blogto.com/events/{id}.jpg"),
    })
}

/// Serves canned listings per date; dates without an entry have no events.
#[derive(Default)]
struct FakeSource {
    listings: HashMap<NaiveDate, Result<Vec<RawEvent>, PortError>>,
    calls: Mutex<Vec<NaiveDate>>,
}

#[async_trait]
impl EventSourcePort for FakeSource {
    async fn fetch_events(&self, date: NaiveDate) -> Result<Vec<RawEvent>, PortError> {
        self.calls.lock().unwrap().push(date);
        self.listings.get(&date).cloned().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Default)]
struct FakeGeocoder {
    calls: Mutex<HashMap<String, u32>>,
}

impl FakeGeocoder {
    fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl GeocoderPort for FakeGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, PortError> {
        *self.calls.lock().unwrap().entry(address.to_string()).or_default() += 1;
        Ok(Some(Coordinates { lat: 43.6532, lng: -79.3832 }))
    }
}

struct FakeWeather;

#[async_trait]
impl WeatherPort for FakeWeather {
    async fn fetch_weather(&self, _date: NaiveDate) -> Result<WeatherSummary, PortError> {
        Ok(WeatherSummary {
            tempmax: Some(25.0),
            tempmin: Some(16.0),
            conditions: Some("Clear".to_string()),
            sunset: Some(2101),
        })
    }
}

/// Labels everything "Live Music Performances" unless overridden, or answers
/// with garbage when `malformed` is set.
#[derive(Default)]
struct FakeCategorizer {
    overrides: HashMap<String, String>,
    malformed: bool,
    calls: Mutex<Vec<usize>>,
}

#[async_trait]
impl CategorizerPort for FakeCategorizer {
    async fn categorize(
        &self,
        batch: &[CategorizationItem],
    ) -> Result<HashMap<String, String>, PortError> {
        self.calls.lock().unwrap().push(batch.len());
        if self.malformed {
            return Err(PortError::Malformed("expected value at line 1 column 1".to_string()));
        }
        Ok(batch
            .iter()
            .map(|item| {
                let label = self
                    .overrides
                    .get(&item.id)
                    .cloned()
                    .unwrap_or_else(|| "Live Music Performances".to_string());
                (item.id.clone(), label)
            })
            .collect())
    }
}

struct Harness {
    source: Arc<FakeSource>,
    geocoder: Arc<FakeGeocoder>,
    categorizer: Arc<FakeCategorizer>,
    publisher: Arc<InMemoryPublisher>,
}

impl Harness {
    fn new(source: FakeSource, categorizer: FakeCategorizer) -> Self {
        Self {
            source: Arc::new(source),
            geocoder: Arc::new(FakeGeocoder::default()),
            categorizer: Arc::new(categorizer),
            publisher: Arc::new(InMemoryPublisher::new()),
        }
    }

    fn orchestrator(&self, config: PipelineConfig) -> Orchestrator {
        let collaborators = Collaborators {
            events: self.source.clone(),
            geocoder: self.geocoder.clone(),
            weather: Arc::new(FakeWeather),
            categorizer: self.categorizer.clone(),
            publisher: self.publisher.clone(),
        };
        Orchestrator::new(config, collaborators).unwrap()
    }
}

fn fast_config(days: u32) -> PipelineConfig {
    PipelineConfig {
        days,
        fetch_delay_ms: 0,
        geocode_delay_ms: 0,
        retry_backoff_ms: 0,
        publish_retry_backoff_ms: 0,
        ..PipelineConfig::default()
    }
}

fn two_day_source() -> FakeSource {
    let mut listings = HashMap::new();
    listings.insert(
        day(1),
        Ok(vec![
            listing(101, "Patio Jazz", "The Rex", "7:00 PM"),
            listing(102, "Comedy Open Mic", "Comedy Bar", "9:30 PM"),
            json!({"id": 103, "venue_name": "Lee's Palace", "start_time": "8:00 PM"}),
        ]),
    );
    listings.insert(day(2), Err(PortError::Status { status: 503, body: "unavailable".to_string() }));
    FakeSource { listings, ..Default::default() }
}

#[tokio::test]
async fn test_two_day_window_with_one_failed_date() {
    let harness = Harness::new(two_day_source(), FakeCategorizer::default());

    let report = harness.orchestrator(fast_config(2)).run_from(day(1)).await;

    assert!(report.succeeded(), "{}", report.summary());
    assert_eq!(report.stage(StageName::Fetch).unwrap().outcome, StageOutcome::Partial);

    let validate = report.stage(StageName::Validate).unwrap();
    assert_eq!((validate.attempted, validate.succeeded, validate.failed), (3, 2, 1));

    let geocode = report.stage(StageName::Geocode).unwrap();
    assert_eq!((geocode.attempted, geocode.succeeded), (2, 2));
    assert_eq!(report.stage(StageName::Weather).unwrap().succeeded, 2);
    assert_eq!(report.stage(StageName::Categorize).unwrap().outcome, StageOutcome::Success);

    let filter = report.stage(StageName::Filter).unwrap();
    assert_eq!((filter.items_before, filter.items_after), (2, 2));

    let schema = report.schema();
    assert_eq!(schema.results_by_date[&day(1)].len(), 2);
    assert!(schema.results_by_date[&day(2)].is_empty());
    assert!(schema.weather_report_by_date[&day(2)].is_some());

    let published = harness.publisher.content("api/schema.js").unwrap();
    assert!(published.contains("\"Patio Jazz\""));
    assert!(published.contains("\"2025-07-02\": []"));
}

#[tokio::test]
async fn test_published_events_carry_enrichment() {
    let harness = Harness::new(two_day_source(), FakeCategorizer::default());

    let report = harness.orchestrator(fast_config(2)).run_from(day(1)).await;

    let events = &report.schema().results_by_date[&day(1)];
    let jazz = events.iter().find(|e| e.id == "101").unwrap();
    assert_eq!(jazz.numeric_time.start, 1900);
    assert_eq!(jazz.numeric_time.end, Some(2300));
    assert_eq!(jazz.lat, Some(43.6532));
    assert_eq!(jazz.category.as_deref(), Some("Live Music Performances"));
    assert_eq!(jazz.venue, "The Rex");
}

#[tokio::test]
async fn test_empty_fetch_aborts_before_validation() {
    let harness = Harness::new(FakeSource::default(), FakeCategorizer::default());

    let report = harness.orchestrator(fast_config(1)).run_from(day(1)).await;

    assert!(!report.succeeded());
    assert_eq!(report.failed_stage(), Some(StageName::Fetch));
    assert!(report.stage(StageName::Fetch).unwrap().outcome.is_fatal());
    for name in &StageName::ALL[1..] {
        let stage = report.stage(*name).unwrap();
        assert_eq!(stage.outcome, StageOutcome::Skipped);
        assert_eq!(stage.attempted, 0);
    }
    assert_eq!(harness.geocoder.total_calls(), 0);
    assert_eq!(harness.publisher.write_count(), 0);
}

#[tokio::test]
async fn test_malformed_categorization_stops_the_run() {
    let categorizer = FakeCategorizer { malformed: true, ..Default::default() };
    let harness = Harness::new(two_day_source(), categorizer);

    let report = harness.orchestrator(fast_config(2)).run_from(day(1)).await;

    assert_eq!(report.failed_stage(), Some(StageName::Categorize));
    // One request plus one retry, each carrying the whole batch
    assert_eq!(*harness.categorizer.calls.lock().unwrap(), vec![2, 2]);
    for name in [StageName::Merge, StageName::Filter, StageName::Publish] {
        assert_eq!(report.stage(name).unwrap().outcome, StageOutcome::Skipped);
    }
    assert!(harness.publisher.content("api/schema.js").is_none());
}

#[tokio::test]
async fn test_repeated_venue_is_geocoded_once() {
    let mut listings = HashMap::new();
    listings.insert(
        day(1),
        Ok(vec![
            listing(201, "Early Set", "Massey Hall", "6:00 PM"),
            listing(202, "Late Set", "Massey Hall", "10:00 PM"),
        ]),
    );
    listings.insert(day(2), Ok(vec![listing(203, "Matinee", "Massey Hall", "2:00 PM")]));
    let harness = Harness::new(FakeSource { listings, ..Default::default() }, FakeCategorizer::default());

    let report = harness.orchestrator(fast_config(2)).run_from(day(1)).await;

    assert!(report.succeeded(), "{}", report.summary());
    let calls = harness.geocoder.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls["Massey Hall, Toronto Canada"], 1);
    assert_eq!(report.stage(StageName::Geocode).unwrap().succeeded, 3);
}

#[tokio::test]
async fn test_excluded_categories_are_not_published() {
    let mut overrides = HashMap::new();
    overrides.insert("102".to_string(), "Seniors Programs".to_string());
    let harness = Harness::new(two_day_source(), FakeCategorizer { overrides, ..Default::default() });

    let report = harness.orchestrator(fast_config(2)).run_from(day(1)).await;

    assert!(report.succeeded());
    let ids: Vec<_> = report.schema().results_by_date[&day(1)].iter().map(|e| e.id.clone()).collect();
    assert_eq!(ids, ["101"]);
    let filter = report.stage(StageName::Filter).unwrap();
    assert_eq!((filter.items_before, filter.items_after), (2, 1));
}

#[tokio::test]
async fn test_uncategorized_events_are_dropped_at_merge() {
    let mut overrides = HashMap::new();
    overrides.insert("102".to_string(), String::new());
    let harness = Harness::new(two_day_source(), FakeCategorizer { overrides, ..Default::default() });

    let report = harness.orchestrator(fast_config(2)).run_from(day(1)).await;

    let merge = report.stage(StageName::Merge).unwrap();
    assert_eq!(merge.outcome, StageOutcome::Partial);
    assert_eq!(merge.failed, 1);
    assert_eq!(report.state.total_events(), 1);
}

#[tokio::test]
async fn test_republishing_same_schema_keeps_content() {
    let harness = Harness::new(two_day_source(), FakeCategorizer::default());
    let orchestrator = harness.orchestrator(fast_config(2));

    let first = orchestrator.run_from(day(1)).await;
    let content = harness.publisher.content("api/schema.js").unwrap();
    let second = orchestrator.run_from(day(1)).await;

    assert!(first.state.published.as_ref().unwrap().created);
    let receipt = second.state.published.as_ref().unwrap();
    assert!(!receipt.created);
    assert_eq!(receipt.attempts, 1);
    assert_eq!(harness.publisher.content("api/schema.js").unwrap(), content);
}

#[tokio::test]
async fn test_publish_conflict_retries_then_fails() {
    let harness = Harness::new(two_day_source(), FakeCategorizer::default());
    let orchestrator = harness.orchestrator(fast_config(2));

    harness.publisher.fail_next_writes_with_conflict(1);
    let recovered = orchestrator.run_from(day(1)).await;
    assert!(recovered.succeeded());
    assert_eq!(recovered.state.published.as_ref().unwrap().attempts, 2);

    harness.publisher.fail_next_writes_with_conflict(2);
    let failed = orchestrator.run_from(day(1)).await;
    assert_eq!(failed.failed_stage(), Some(StageName::Publish));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_waits_between_dates() {
    let harness = Harness::new(two_day_source(), FakeCategorizer::default());
    let config = PipelineConfig { fetch_delay_ms: 5_000, ..fast_config(3) };
    let started = tokio::time::Instant::now();

    harness.orchestrator(config).run_from(day(1)).await;

    assert_eq!(*harness.source.calls.lock().unwrap(), vec![day(1), day(2), day(2), day(2), day(3)]);
    assert!(started.elapsed() >= std::time::Duration::from_secs(20));
}

#[test]
fn test_stage_reports_serialize_for_summaries() {
    let value: Value = serde_json::to_value(datespot_aggregator::pipeline::StageReport::skipped(
        StageName::Merge,
        4,
    ))
    .unwrap();
    assert_eq!(value["stage"], "merge");
    assert_eq!(value["outcome"], "skipped");
    assert_eq!(value["elapsed"], 0);
}
