use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::pipeline::{Stage, StageName, StageResult};
use crate::types::{Enrichment, WorkflowState};

/// Joins category labels onto events by id and drops events left without one.
pub struct MergeStage;

#[async_trait]
impl Stage for MergeStage {
    fn name(&self) -> StageName {
        StageName::Merge
    }

    #[instrument(skip_all, fields(stage = "merge"))]
    async fn execute(&self, state: &mut WorkflowState) -> StageResult {
        let attempted = state.total_events();
        let categories = &state.categories;

        for bucket in state.buckets.values_mut() {
            for event in bucket.events.iter_mut() {
                let label = categories
                    .get(&event.id)
                    .map(|c| c.trim())
                    .filter(|c| !c.is_empty())
                    .map(str::to_string);
                event.category.settle(Enrichment::from(label));
            }
            let before = bucket.events.len();
            bucket.events.retain(|e| e.category.is_resolved());
            if bucket.events.len() < before {
                warn!("✗ {}: {} uncategorized events dropped", bucket.date, before - bucket.events.len());
            }
        }

        let kept = state.total_events();
        if attempted > 0 && kept == 0 {
            return StageResult::fatal(attempted, 0, "no event received a category");
        }

        info!("✓ {}/{} events categorized", kept, attempted);
        StageResult::from_counts(
            attempted,
            kept,
            attempted - kept,
            format!("{} events merged, {} uncategorized dropped", kept, attempted - kept),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_utils::anchor;
    use crate::types::{Event, NumericTime};
    use chrono::{NaiveDate, NaiveTime};
    use chrono_tz::America::Toronto;

    fn event(id: &str) -> Event {
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        Event {
            id: id.to_string(),
            title: format!("Show {id}"),
            description: String::new(),
            venue_name: "The Rex".to_string(),
            venue_address: None,
            starts_at: anchor(date, NaiveTime::from_hms_opt(21, 0, 0).unwrap(), Toronto).unwrap(),
            ends_at: None,
            numeric_time: NumericTime { start: 2100, end: None },
            share_url: None,
            image_url: None,
            coordinates: Enrichment::Pending,
            category: Enrichment::Pending,
        }
    }

    #[tokio::test]
    async fn test_events_without_label_are_dropped() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let mut state = WorkflowState::new([date]);
        state.buckets.get_mut(&date).unwrap().events = vec![event("1"), event("2"), event("3")];
        state.categories.insert("1".to_string(), "Live Music".to_string());
        state.categories.insert("3".to_string(), "  ".to_string());

        let result = MergeStage.execute(&mut state).await;

        assert_eq!(result.outcome, crate::pipeline::StageOutcome::Partial);
        assert_eq!(result.failed, 2);
        let kept: Vec<_> = state.events().collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].category.resolved().map(String::as_str), Some("Live Music"));
    }

    #[tokio::test]
    async fn test_no_labels_at_all_is_fatal() {
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let mut state = WorkflowState::new([date]);
        state.buckets.get_mut(&date).unwrap().events = vec![event("1")];

        let result = MergeStage.execute(&mut state).await;

        assert!(result.outcome.is_fatal());
    }
}
