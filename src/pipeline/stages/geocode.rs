use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::app::GeocoderPort;
use crate::config::GeocodeFailurePolicy;
use crate::pipeline::{RateLimiter, RetryPolicy, Stage, StageName, StageResult};
use crate::types::{Coordinates, Enrichment, Event, WorkflowState};

/// Resolves venue locations, querying each distinct address once per run.
pub struct GeocodeStage {
    geocoder: Arc<dyn GeocoderPort>,
    limiter: RateLimiter,
    policy: RetryPolicy,
    region: String,
    on_failure: GeocodeFailurePolicy,
}

impl GeocodeStage {
    pub fn new(
        geocoder: Arc<dyn GeocoderPort>,
        limiter: RateLimiter,
        policy: RetryPolicy,
        region: String,
        on_failure: GeocodeFailurePolicy,
    ) -> Self {
        Self { geocoder, limiter, policy, region, on_failure }
    }

    /// Address sent to the geocoder: the street address when the source has
    /// one, otherwise the venue name qualified with the region.
    pub fn query_for(&self, event: &Event) -> String {
        match &event.venue_address {
            Some(address) => address.clone(),
            None if self.region.is_empty() => event.venue_name.clone(),
            None => format!("{}, {}", event.venue_name, self.region),
        }
    }

    async fn lookup(&self, query: &str) -> Option<Coordinates> {
        match self
            .policy
            .call_throttled("geocode", &self.limiter, || self.geocoder.geocode(query))
            .await
        {
            Ok(Some(coords)) => {
                info!("✓ {} → {:.4}, {:.4}", query, coords.lat, coords.lng);
                Some(coords)
            }
            Ok(None) => {
                warn!("✗ {}: no geocoding result", query);
                None
            }
            Err(e) => {
                warn!("✗ {}: geocoding failed: {}", query, e);
                None
            }
        }
    }
}

fn cache_key(query: &str) -> String {
    query.trim().to_lowercase()
}

#[async_trait]
impl Stage for GeocodeStage {
    fn name(&self) -> StageName {
        StageName::Geocode
    }

    #[instrument(skip_all, fields(stage = "geocode"))]
    async fn execute(&self, state: &mut WorkflowState) -> StageResult {
        // Failed lookups are cached too, so a bad venue is only tried once
        let mut cache: HashMap<String, Option<Coordinates>> = HashMap::new();
        let mut attempted = 0;
        let mut located = 0;

        for (date, bucket) in state.buckets.iter_mut() {
            info!("📅 Geocoding {} venues for {}", bucket.events.len(), date);
            for event in bucket.events.iter_mut() {
                if !event.coordinates.is_pending() {
                    continue;
                }
                attempted += 1;
                let query = self.query_for(event);
                let key = cache_key(&query);
                let coords = match cache.get(&key) {
                    Some(cached) => *cached,
                    None => {
                        let found = self.lookup(&query).await;
                        cache.insert(key, found);
                        found
                    }
                };
                if coords.is_some() {
                    located += 1;
                }
                event.coordinates.settle(Enrichment::from(coords));
            }
        }

        let lookups = cache.len();
        let resolved_lookups = cache.values().filter(|c| c.is_some()).count();
        let unlocated = attempted - located;

        if attempted > 0 && resolved_lookups == 0 {
            return StageResult::fatal(
                attempted,
                0,
                format!("none of {} venue lookups succeeded", lookups),
            );
        }

        if self.on_failure == GeocodeFailurePolicy::Drop {
            for bucket in state.buckets.values_mut() {
                bucket.events.retain(|e| !matches!(e.coordinates, Enrichment::Failed));
            }
        }

        StageResult::from_counts(
            attempted,
            located,
            unlocated,
            format!(
                "{}/{} events located with {} lookups ({} unresolved, policy {:?})",
                located,
                attempted,
                lookups,
                lookups - resolved_lookups,
                self.on_failure
            ),
        )
    }
}
