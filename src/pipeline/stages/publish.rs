use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::app::{PublisherPort, VersionToken, WriteOutcome};
use crate::error::PortError;
use crate::pipeline::schema::Schema;
use crate::pipeline::{RetryPolicy, Stage, StageName, StageResult};
use crate::types::{PublishReceipt, WorkflowState};

/// Writes the rendered schema with a compare-and-swap update.
pub struct PublishStage {
    publisher: Arc<dyn PublisherPort>,
    policy: RetryPolicy,
    path: String,
    conflict_retries: u32,
    conflict_backoff: Duration,
}

impl PublishStage {
    pub fn new(
        publisher: Arc<dyn PublisherPort>,
        policy: RetryPolicy,
        path: String,
        conflict_retries: u32,
        conflict_backoff: Duration,
    ) -> Self {
        Self { publisher, policy, path, conflict_retries, conflict_backoff }
    }

    async fn read_version(&self) -> Result<Option<VersionToken>, PortError> {
        self.policy
            .call("read_current_version", || self.publisher.read_current_version(&self.path))
            .await
    }

    /// Read-then-write loop. A stale token triggers a fresh read and another
    /// write, at most `conflict_retries` times.
    async fn publish(&self, content: &str) -> Result<PublishReceipt, String> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let current = self.read_version().await.map_err(|e| format!("reading current version failed: {}", e))?;
            match &current {
                Some(token) => info!("🔍 Existing {} at version {}", self.path, token),
                None => info!("🔍 No existing {}, creating it", self.path),
            }

            let outcome = self
                .policy
                .call("write", || self.publisher.write(&self.path, content, current.as_ref()))
                .await
                .map_err(|e| format!("write failed: {}", e))?;

            match outcome {
                WriteOutcome::Written(version) => {
                    return Ok(PublishReceipt {
                        path: self.path.clone(),
                        version: version.0,
                        created: current.is_none(),
                        attempts,
                    });
                }
                WriteOutcome::Conflict if attempts <= self.conflict_retries => {
                    warn!("⚠️ Version conflict on {}, refetching (attempt {})", self.path, attempts);
                    tokio::time::sleep(self.conflict_backoff).await;
                }
                WriteOutcome::Conflict => {
                    return Err(format!("version conflict persisted after {} attempts", attempts));
                }
            }
        }
    }
}

#[async_trait]
impl Stage for PublishStage {
    fn name(&self) -> StageName {
        StageName::Publish
    }

    #[instrument(skip_all, fields(stage = "publish", path = %self.path))]
    async fn execute(&self, state: &mut WorkflowState) -> StageResult {
        let schema = Schema::from_state(state);
        let events = schema.event_count();
        let content = match schema.render_module() {
            Ok(content) => content,
            Err(e) => return StageResult::fatal(events, 0, format!("rendering schema failed: {}", e)),
        };
        info!("📝 Publishing {} events ({} bytes)", events, content.len());

        match self.publish(&content).await {
            Ok(receipt) => {
                let message = format!(
                    "{} {} at version {} after {} attempt(s)",
                    if receipt.created { "created" } else { "updated" },
                    receipt.path,
                    receipt.version,
                    receipt.attempts
                );
                state.published = Some(receipt);
                StageResult::success(events, message)
            }
            Err(cause) => StageResult::fatal(events, 0, cause),
        }
    }
}
