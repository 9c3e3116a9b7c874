use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::app::{CategorizationItem, CategorizerPort};
use crate::constants::CATEGORIZATION_TEXT_LIMIT;
use crate::pipeline::{RetryPolicy, Stage, StageName, StageResult};
use crate::types::WorkflowState;

/// Sends every surviving event to the categorizer in one batched request.
pub struct CategorizeStage {
    categorizer: Arc<dyn CategorizerPort>,
    policy: RetryPolicy,
}

impl CategorizeStage {
    pub fn new(categorizer: Arc<dyn CategorizerPort>, policy: RetryPolicy) -> Self {
        Self { categorizer, policy }
    }
}

/// Replaces line breaks and non-ASCII characters with spaces, collapses runs
/// of whitespace, and truncates to the categorization text limit.
pub fn cleanse_text(text: &str) -> String {
    let ascii: String = text
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { ' ' })
        .collect();
    let collapsed = ascii.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(CATEGORIZATION_TEXT_LIMIT).collect()
}

/// One item per distinct event id, in bucket order.
pub fn build_batch(state: &WorkflowState) -> Vec<CategorizationItem> {
    let mut seen = HashSet::new();
    state
        .events()
        .filter(|e| seen.insert(e.id.as_str()))
        .map(|e| CategorizationItem {
            id: e.id.clone(),
            title: e.title.clone(),
            description: cleanse_text(&e.description),
        })
        .collect()
}

#[async_trait]
impl Stage for CategorizeStage {
    fn name(&self) -> StageName {
        StageName::Categorize
    }

    #[instrument(skip_all, fields(stage = "categorize"))]
    async fn execute(&self, state: &mut WorkflowState) -> StageResult {
        let batch = build_batch(state);
        if batch.is_empty() {
            return StageResult::success(0, "no events to categorize".to_string());
        }

        info!("🤖 Categorizing {} events in a single request", batch.len());
        let response = self
            .policy
            .call("categorize", || self.categorizer.categorize(&batch))
            .await;

        match response {
            Ok(categories) => {
                let covered = batch.iter().filter(|item| categories.contains_key(&item.id)).count();
                if covered < batch.len() {
                    warn!("⚠️ {} of {} events came back without a category", batch.len() - covered, batch.len());
                }
                state.categories = categories;
                // Missing labels are counted by the merge stage
                StageResult::success(
                    batch.len(),
                    format!("labels returned for {}/{} events", covered, batch.len()),
                )
            }
            Err(e) => StageResult::fatal(batch.len(), 0, format!("categorization failed: {}", e)),
        }
    }
}
