use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::app::EventSourcePort;
use crate::pipeline::{RateLimiter, RetryPolicy, Stage, StageName, StageResult};
use crate::types::WorkflowState;

/// Pulls raw listings for every date of the window, one call at a time.
pub struct FetchStage {
    source: Arc<dyn EventSourcePort>,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl FetchStage {
    pub fn new(source: Arc<dyn EventSourcePort>, limiter: RateLimiter, policy: RetryPolicy) -> Self {
        Self { source, limiter, policy }
    }
}

#[async_trait]
impl Stage for FetchStage {
    fn name(&self) -> StageName {
        StageName::Fetch
    }

    #[instrument(skip_all, fields(stage = "fetch"))]
    async fn execute(&self, state: &mut WorkflowState) -> StageResult {
        let dates = state.dates();
        let mut fetched_dates = 0;
        let mut failed_dates = 0;

        for (i, date) in dates.iter().copied().enumerate() {
            info!("📅 Fetching date {}/{}: {}", i + 1, dates.len(), date);
            let result = self
                .policy
                .call_throttled("fetch_events", &self.limiter, || self.source.fetch_events(date))
                .await;

            let Some(bucket) = state.buckets.get_mut(&date) else { continue };
            match result {
                Ok(events) => {
                    info!("✓ {}: {} events fetched", date, events.len());
                    bucket.raw_events = events;
                    fetched_dates += 1;
                }
                Err(e) => {
                    warn!("✗ {}: fetch failed, recording zero events: {}", date, e);
                    bucket.raw_events.clear();
                    failed_dates += 1;
                }
            }
        }

        let total = state.total_raw_events();
        if total == 0 {
            return StageResult::fatal(
                dates.len(),
                fetched_dates,
                format!("no events fetched for any of {} dates", dates.len()),
            );
        }

        StageResult::from_counts(
            dates.len(),
            fetched_dates,
            failed_dates,
            format!("{} events across {}/{} dates", total, fetched_dates, dates.len()),
        )
    }
}
