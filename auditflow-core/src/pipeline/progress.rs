//! Stage-state writes that keep the registry and the run manifest in step.

use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::error::{RegistryError, StageError};
use crate::pipeline::registry::RunRegistry;
use crate::pipeline::types::{RunSnapshot, StageId, StageState};

/// Applies stage transitions to the registry and rewrites the run's
/// `run.json` after each one.
#[derive(Debug, Clone)]
pub struct RunTracker {
    registry: RunRegistry,
    artifacts: ArtifactStore,
}

impl RunTracker {
    pub fn new(registry: RunRegistry, artifacts: ArtifactStore) -> Self {
        Self { registry, artifacts }
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Apply one transition. A manifest that cannot be written is logged;
    /// the in-memory state stays authoritative.
    pub async fn transition(
        &self,
        run_id: Uuid,
        state: StageState,
    ) -> Result<RunSnapshot, RegistryError> {
        let run = self.registry.set_stage_state(run_id, state).await?;
        self.save_manifest(&run).await;
        Ok(run)
    }

    pub async fn save_manifest(&self, run: &RunSnapshot) {
        if let Err(e) = self.artifacts.write_manifest(run).await {
            warn!(run_id = %run.run_id, error = %e, "Failed to write run manifest");
        }
    }
}

/// Handle a running stage uses to publish intermediate progress.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tracker: RunTracker,
    run_id: Uuid,
    stage: StageId,
    delay: Duration,
}

impl ProgressReporter {
    pub fn new(tracker: RunTracker, run_id: Uuid, stage: StageId, delay: Duration) -> Self {
        Self {
            tracker,
            run_id,
            stage,
            delay,
        }
    }

    /// Wait out the simulated latency, then record `progress`.
    pub async fn checkpoint(&self, progress: u8) -> Result<(), StageError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.report(progress).await
    }

    /// Record `progress` immediately. Progress must not go backwards.
    pub async fn report(&self, progress: u8) -> Result<(), StageError> {
        self.tracker
            .transition(self.run_id, StageState::running(self.stage, progress))
            .await
            .map(|_| ())
            .map_err(|e| StageError::ExecutionFailed {
                stage: self.stage,
                message: e.to_string(),
            })
    }
}
