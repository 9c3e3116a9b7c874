// Aggregation pipeline: stage contract, orchestration, and call policies

pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;
pub mod schema;
pub mod stages;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::types::WorkflowState;

pub use orchestrator::{Collaborators, Orchestrator, RunReport};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;

/// Common trait for all pipeline stages
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    /// Run this stage against the accumulated state. Item-level failures are
    /// absorbed here and only show up in the returned counts.
    async fn execute(&self, state: &mut WorkflowState) -> StageResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Fetch,
    Validate,
    Geocode,
    Weather,
    Categorize,
    Merge,
    Filter,
    Publish,
}

impl StageName {
    /// Fixed execution order.
    pub const ALL: [StageName; 8] = [
        StageName::Fetch,
        StageName::Validate,
        StageName::Geocode,
        StageName::Weather,
        StageName::Categorize,
        StageName::Merge,
        StageName::Filter,
        StageName::Publish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Fetch => "fetch",
            StageName::Validate => "validate",
            StageName::Geocode => "geocode",
            StageName::Weather => "weather",
            StageName::Categorize => "categorize",
            StageName::Merge => "merge",
            StageName::Filter => "filter",
            StageName::Publish => "publish",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "cause", rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    /// Some items were lost; the run continues.
    Partial,
    /// The run cannot continue.
    Fatal(String),
    /// Not executed because an earlier stage was fatal.
    Skipped,
}

impl StageOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageOutcome::Fatal(_))
    }
}

/// Result of executing a pipeline stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub outcome: StageOutcome,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub message: String,
}

impl StageResult {
    /// Success when nothing failed, partial otherwise.
    pub fn from_counts(attempted: usize, succeeded: usize, failed: usize, message: String) -> Self {
        let outcome = if failed == 0 { StageOutcome::Success } else { StageOutcome::Partial };
        Self { outcome, attempted, succeeded, failed, message }
    }

    pub fn success(processed: usize, message: String) -> Self {
        Self::from_counts(processed, processed, 0, message)
    }

    pub fn fatal(attempted: usize, succeeded: usize, cause: impl Into<String>) -> Self {
        let cause = cause.into();
        Self {
            outcome: StageOutcome::Fatal(cause.clone()),
            attempted,
            succeeded,
            failed: attempted.saturating_sub(succeeded),
            message: cause,
        }
    }
}

/// Observable record of one stage within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: StageName,
    #[serde(flatten)]
    pub outcome: StageOutcome,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items_before: usize,
    pub items_after: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub message: String,
}

impl StageReport {
    pub fn new(stage: StageName, result: StageResult, items_before: usize, items_after: usize, elapsed: Duration) -> Self {
        Self {
            stage,
            outcome: result.outcome,
            attempted: result.attempted,
            succeeded: result.succeeded,
            failed: result.failed,
            items_before,
            items_after,
            elapsed,
            message: result.message,
        }
    }

    pub fn skipped(stage: StageName, items: usize) -> Self {
        Self {
            stage,
            outcome: StageOutcome::Skipped,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            items_before: items,
            items_after: items,
            elapsed: Duration::ZERO,
            message: "not executed".to_string(),
        }
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
