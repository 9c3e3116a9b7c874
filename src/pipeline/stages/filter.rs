use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{info, instrument};

use crate::pipeline::{Stage, StageName, StageResult};
use crate::types::{DateBucket, WorkflowState};

/// Removes events whose category is on the exclusion list.
pub struct FilterStage {
    excluded: HashSet<String>,
}

impl FilterStage {
    pub fn new(excluded: impl IntoIterator<Item = String>) -> Self {
        Self { excluded: excluded.into_iter().collect() }
    }
}

/// Drops excluded events from one bucket and returns how many were removed.
/// Events without a category are kept.
pub fn filter_events(bucket: &mut DateBucket, excluded: &HashSet<String>) -> usize {
    let before = bucket.events.len();
    bucket
        .events
        .retain(|e| e.category.resolved().map_or(true, |c| !excluded.contains(c)));
    before - bucket.events.len()
}

#[async_trait]
impl Stage for FilterStage {
    fn name(&self) -> StageName {
        StageName::Filter
    }

    #[instrument(skip_all, fields(stage = "filter"))]
    async fn execute(&self, state: &mut WorkflowState) -> StageResult {
        let attempted = state.total_events();
        let removed: usize = state
            .buckets
            .values_mut()
            .map(|bucket| filter_events(bucket, &self.excluded))
            .sum();

        info!("🧹 Filtered out {} events in excluded categories", removed);
        // Exclusions are intended; they are not counted as failures
        StageResult::success(
            attempted,
            format!("{} kept, {} excluded", attempted - removed, removed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_utils::anchor;
    use crate::types::{Enrichment, Event, NumericTime};
    use chrono::{NaiveDate, NaiveTime};
    use chrono_tz::America::Toronto;

    fn event(id: &str, category: Option<&str>) -> Event {
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        Event {
            id: id.to_string(),
            title: format!("Event {id}"),
            description: String::new(),
            venue_name: "Harbourfront Centre".to_string(),
            venue_address: None,
            starts_at: anchor(date, NaiveTime::from_hms_opt(10, 0, 0).unwrap(), Toronto).unwrap(),
            ends_at: None,
            numeric_time: NumericTime { start: 1000, end: None },
            share_url: None,
            image_url: None,
            coordinates: Enrichment::Pending,
            category: category.map_or(Enrichment::Pending, |c| Enrichment::Resolved(c.to_string())),
        }
    }

    fn bucket() -> DateBucket {
        let mut bucket = DateBucket::new(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap());
        bucket.events = vec![
            event("1", Some("Live Music")),
            event("2", Some("Camps & Kids Programs")),
            event("3", None),
            event("4", Some("Seniors Programs")),
        ];
        bucket
    }

    fn excluded() -> HashSet<String> {
        ["Camps & Kids Programs", "Seniors Programs"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_excluded_categories_are_removed() {
        let mut bucket = bucket();
        assert_eq!(filter_events(&mut bucket, &excluded()), 2);
        let ids: Vec<_> = bucket.events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[test]
    fn test_filtering_twice_matches_filtering_once() {
        let mut once = bucket();
        filter_events(&mut once, &excluded());
        let mut twice = once.clone();
        assert_eq!(filter_events(&mut twice, &excluded()), 0);
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_empty_dates_remain() {
        let d1 = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
        let mut state = WorkflowState::new([d1, d2]);
        state.buckets.insert(d1, bucket());

        let result = FilterStage::new(excluded()).execute(&mut state).await;

        assert_eq!(result.attempted, 4);
        assert_eq!(state.event_counts()[&d1], 2);
        assert_eq!(state.event_counts()[&d2], 0);
    }
}
