use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::app::WeatherPort;
use crate::pipeline::{RetryPolicy, Stage, StageName, StageResult};
use crate::types::{Enrichment, WorkflowState};

/// Attaches a forecast to every date. Lookups run concurrently; results are
/// written back to the buckets once all of them have finished.
pub struct WeatherStage {
    weather: Arc<dyn WeatherPort>,
    policy: RetryPolicy,
}

impl WeatherStage {
    pub fn new(weather: Arc<dyn WeatherPort>, policy: RetryPolicy) -> Self {
        Self { weather, policy }
    }
}

#[async_trait]
impl Stage for WeatherStage {
    fn name(&self) -> StageName {
        StageName::Weather
    }

    #[instrument(skip_all, fields(stage = "weather"))]
    async fn execute(&self, state: &mut WorkflowState) -> StageResult {
        let dates: Vec<_> = state
            .buckets
            .values()
            .filter(|b| b.weather.is_pending())
            .map(|b| b.date)
            .collect();

        let lookups = dates.iter().map(|&date| {
            let weather = Arc::clone(&self.weather);
            let policy = self.policy;
            async move {
                let result = policy.call("fetch_weather", || weather.fetch_weather(date)).await;
                (date, result)
            }
        });
        let results = join_all(lookups).await;

        let mut succeeded = 0;
        let mut failed = 0;
        for (date, result) in results {
            let Some(bucket) = state.buckets.get_mut(&date) else { continue };
            match result {
                Ok(summary) => {
                    info!("✓ {}: {:?}", date, summary.conditions);
                    bucket.weather.settle(Enrichment::Resolved(summary));
                    succeeded += 1;
                }
                Err(e) => {
                    warn!("✗ {}: weather unavailable: {}", date, e);
                    bucket.weather.settle(Enrichment::Failed);
                    failed += 1;
                }
            }
        }

        if !dates.is_empty() && succeeded == 0 {
            return StageResult::fatal(dates.len(), 0, "weather unavailable for every date");
        }

        StageResult::from_counts(
            dates.len(),
            succeeded,
            failed,
            format!("weather for {}/{} dates", succeeded, dates.len()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortError;
    use crate::types::WeatherSummary;
    use chrono::NaiveDate;
    use std::time::Duration;

    struct FlakyWeather {
        bad: NaiveDate,
    }

    #[async_trait]
    impl WeatherPort for FlakyWeather {
        async fn fetch_weather(&self, date: NaiveDate) -> Result<WeatherSummary, PortError> {
            if date == self.bad {
                return Err(PortError::Api("no forecast".to_string()));
            }
            Ok(WeatherSummary {
                tempmax: Some(24.0),
                tempmin: Some(15.5),
                conditions: Some("Clear".to_string()),
                sunset: Some(2102),
            })
        }
    }

    /// Takes five seconds per date.
    struct SlowWeather;

    #[async_trait]
    impl WeatherPort for SlowWeather {
        async fn fetch_weather(&self, _date: NaiveDate) -> Result<WeatherSummary, PortError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(WeatherSummary { tempmax: None, tempmin: None, conditions: None, sunset: None })
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(0, Duration::from_secs(1), Duration::ZERO)
    }

    #[tokio::test]
    async fn test_failed_date_keeps_running() {
        let d1 = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 7, 2).unwrap();
        let mut state = WorkflowState::new([d1, d2]);

        let result = WeatherStage::new(Arc::new(FlakyWeather { bad: d2 }), policy())
            .execute(&mut state)
            .await;

        assert_eq!(result.outcome, crate::pipeline::StageOutcome::Partial);
        assert!(state.buckets[&d1].weather.is_resolved());
        assert_eq!(state.buckets[&d2].weather, Enrichment::Failed);
    }

    #[tokio::test]
    async fn test_every_date_failing_is_fatal() {
        let d1 = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let mut state = WorkflowState::new([d1]);

        let result = WeatherStage::new(Arc::new(FlakyWeather { bad: d1 }), policy())
            .execute(&mut state)
            .await;

        assert!(result.outcome.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dates_are_fetched_concurrently() {
        let dates = crate::time_utils::window_dates(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(), 7);
        let mut state = WorkflowState::new(dates);
        let policy = RetryPolicy::new(0, Duration::from_secs(30), Duration::ZERO);
        let started = tokio::time::Instant::now();

        let result = WeatherStage::new(Arc::new(SlowWeather), policy).execute(&mut state).await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(result.succeeded, 7);
        assert!(state.buckets.values().all(|b| b.weather.is_resolved()));
    }
}
