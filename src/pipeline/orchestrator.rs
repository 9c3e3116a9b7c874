use chrono::NaiveDate;
use metrics::{counter, histogram};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::schema::Schema;
use super::stages::{
    CategorizeStage, FetchStage, FilterStage, GeocodeStage, MergeStage, PublishStage, ValidateStage,
    WeatherStage,
};
use super::{RateLimiter, Stage, StageName, StageOutcome, StageReport, StageResult};
use crate::app::{CategorizerPort, EventSourcePort, GeocoderPort, PublisherPort, WeatherPort};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::time_utils::{today_in, window_dates};
use crate::types::{RunStatus, WorkflowState};

/// External services the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub events: Arc<dyn EventSourcePort>,
    pub geocoder: Arc<dyn GeocoderPort>,
    pub weather: Arc<dyn WeatherPort>,
    pub categorizer: Arc<dyn CategorizerPort>,
    pub publisher: Arc<dyn PublisherPort>,
}

/// Drives the eight stages in fixed order and stops at the first fatal one.
pub struct Orchestrator {
    config: PipelineConfig,
    stages: Vec<Box<dyn Stage>>,
}

impl Orchestrator {
    /// Validates `config` and wires every stage to its collaborator.
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(FetchStage::new(
                collaborators.events,
                RateLimiter::new(config.fetch_delay()),
                config.retry_policy(),
            )),
            Box::new(ValidateStage::new(config.required_fields.clone(), config.timezone)),
            Box::new(GeocodeStage::new(
                collaborators.geocoder,
                RateLimiter::new(config.geocode_delay()),
                config.retry_policy(),
                config.geocode_region.clone(),
                config.geocode_failure,
            )),
            Box::new(WeatherStage::new(collaborators.weather, config.retry_policy())),
            Box::new(CategorizeStage::new(collaborators.categorizer, config.categorize_policy())),
            Box::new(MergeStage),
            Box::new(FilterStage::new(config.excluded_categories.iter().cloned())),
            Box::new(PublishStage::new(
                collaborators.publisher,
                config.retry_policy(),
                config.publish_path.clone(),
                config.publish_conflict_retries,
                config.publish_retry_backoff(),
            )),
        ];

        Ok(Self { config, stages })
    }

    /// Runs the pipeline for a window starting today in the configured zone.
    pub async fn run(&self) -> RunReport {
        self.run_from(today_in(self.config.timezone)).await
    }

    pub async fn run_from(&self, start: NaiveDate) -> RunReport {
        let run_started = Instant::now();
        let dates = window_dates(start, self.config.days);
        info!("🚀 Starting aggregation run for {} dates from {}", dates.len(), start);
        counter!("aggregator_runs_total").increment(1);

        let mut state = WorkflowState::new(dates);
        let total = self.stages.len();

        for (i, stage) in self.stages.iter().enumerate() {
            let name = stage.name();

            if matches!(state.status, RunStatus::Failed { .. }) {
                warn!("⏭️ Skipping stage {}/{}: {}", i + 1, total, name);
                state.reports.push(StageReport::skipped(name, state.item_count()));
                continue;
            }

            info!("📍 STEP {}/{}: {}", i + 1, total, name);
            let items_before = state.item_count();
            let started = Instant::now();
            let mut result = stage.execute(&mut state).await;
            let elapsed = started.elapsed();
            let items_after = state.item_count();

            // A stage that leaves nothing behind cannot feed the next one
            if !result.outcome.is_fatal() && items_after == 0 && name != StageName::Publish {
                result = StageResult::fatal(
                    result.attempted,
                    result.succeeded,
                    format!("no events left after {}", name),
                );
            }

            record_metrics(name, &result, elapsed);
            self.log_result(name, &result, items_before, items_after, elapsed);

            if let StageOutcome::Fatal(cause) = &result.outcome {
                state.status = RunStatus::Failed { stage: name, cause: cause.clone() };
            }
            state
                .reports
                .push(StageReport::new(name, result, items_before, items_after, elapsed));
        }

        if state.status == RunStatus::Running {
            state.status = RunStatus::Succeeded;
        }

        let report = RunReport { state, elapsed: run_started.elapsed() };
        histogram!("aggregator_run_duration_seconds").record(report.elapsed.as_secs_f64());
        match report.failed_stage() {
            None => info!("🎉 Run succeeded: {}", report.summary()),
            Some(stage) => {
                counter!("aggregator_runs_failed_total", "stage" => stage.as_str()).increment(1);
                error!("💥 Run failed at {}: {}", stage, report.summary());
            }
        }
        report
    }

    fn log_result(
        &self,
        name: StageName,
        result: &StageResult,
        items_before: usize,
        items_after: usize,
        elapsed: Duration,
    ) {
        match &result.outcome {
            StageOutcome::Success => info!(
                "✅ {} succeeded in {:.2}s ({} → {} items): {}",
                name, elapsed.as_secs_f64(), items_before, items_after, result.message
            ),
            StageOutcome::Partial => warn!(
                "⚠️ {} partial in {:.2}s ({} → {} items, {} failed): {}",
                name, elapsed.as_secs_f64(), items_before, items_after, result.failed, result.message
            ),
            StageOutcome::Fatal(cause) => error!(
                "❌ {} fatal after {:.2}s ({} attempted, {} succeeded): {}",
                name, elapsed.as_secs_f64(), result.attempted, result.succeeded, cause
            ),
            StageOutcome::Skipped => {}
        }
    }
}

fn record_metrics(name: StageName, result: &StageResult, elapsed: Duration) {
    let stage = name.as_str();
    counter!("aggregator_stage_items_attempted_total", "stage" => stage).increment(result.attempted as u64);
    counter!("aggregator_stage_items_succeeded_total", "stage" => stage).increment(result.succeeded as u64);
    counter!("aggregator_stage_items_failed_total", "stage" => stage).increment(result.failed as u64);
    histogram!("aggregator_stage_duration_seconds", "stage" => stage).record(elapsed.as_secs_f64());
}

/// Final state of a run together with its wall-clock duration.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: WorkflowState,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state.status == RunStatus::Succeeded
    }

    pub fn failed_stage(&self) -> Option<StageName> {
        match &self.state.status {
            RunStatus::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn stage(&self, name: StageName) -> Option<&StageReport> {
        self.state.report(name)
    }

    pub fn reports(&self) -> &[StageReport] {
        &self.state.reports
    }

    pub fn event_counts(&self) -> BTreeMap<NaiveDate, usize> {
        self.state.event_counts()
    }

    /// What would be (or was) published for this run.
    pub fn schema(&self) -> Schema {
        Schema::from_state(&self.state)
    }

    /// One-line description: events per date on success, the failing stage
    /// and its cause otherwise.
    pub fn summary(&self) -> String {
        match &self.state.status {
            RunStatus::Failed { stage, cause } => {
                format!("stage {} failed: {} ({:.1}s)", stage, cause, self.elapsed.as_secs_f64())
            }
            _ => {
                let per_date: Vec<String> = self
                    .event_counts()
                    .iter()
                    .map(|(date, count)| format!("{}: {}", date, count))
                    .collect();
                format!(
                    "{} events [{}] ({:.1}s)",
                    self.state.total_events(),
                    per_date.join(", "),
                    self.elapsed.as_secs_f64()
                )
            }
        }
    }
}
