//! Pipeline executor: runs the ordered stages of one run to completion or
//! first failure, one tokio task per run.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::dataset::DatasetSource;
use crate::error::{RegistryError, StageError};
use crate::pipeline::progress::{ProgressReporter, RunTracker};
use crate::pipeline::registry::RunRegistry;
use crate::pipeline::stages::{PipelineState, Stage, StageContext, StateUpdate, default_stages};
use crate::pipeline::types::{RunSnapshot, StageState};

/// Submits runs and drives them through the stage list.
#[derive(Clone)]
pub struct PipelineExecutor {
    tracker: RunTracker,
    stages: Arc<Vec<Arc<dyn Stage>>>,
    stage_delay: Duration,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("stages", &self.stages.iter().map(|s| s.id()).collect::<Vec<_>>())
            .field("stage_delay", &self.stage_delay)
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    /// Build an executor over an explicit stage list. Stages run in the order
    /// given; the registry rejects any stage that starts out of order.
    pub fn new(
        registry: RunRegistry,
        artifacts: ArtifactStore,
        stages: Vec<Arc<dyn Stage>>,
        stage_delay: Duration,
    ) -> Self {
        Self {
            tracker: RunTracker::new(registry, artifacts),
            stages: Arc::new(stages),
            stage_delay,
        }
    }

    /// Build an executor running the five audit stages against `source`.
    pub fn with_source(
        registry: RunRegistry,
        artifacts: ArtifactStore,
        source: Arc<dyn DatasetSource>,
        stage_delay: Duration,
    ) -> Self {
        Self::new(registry, artifacts, default_stages(source), stage_delay)
    }

    pub fn registry(&self) -> &RunRegistry {
        self.tracker.registry()
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        self.tracker.artifacts()
    }

    /// Register a run and start it in the background.
    ///
    /// Returns immediately with the pending run; the handle resolves once the
    /// run has completed or failed.
    pub async fn submit(
        &self,
        audit_id: impl Into<String>,
        audit_name: impl Into<String>,
    ) -> (RunSnapshot, JoinHandle<()>) {
        let run = self.tracker.registry().create(audit_id, audit_name).await;
        self.tracker.save_manifest(&run).await;
        info!(
            run_id = %run.run_id,
            audit_id = %run.audit_id,
            audit_name = %run.audit_name,
            "Audit run submitted"
        );

        let executor = self.clone();
        let run_id = run.run_id;
        let handle = tokio::spawn(async move {
            if let Err(e) = executor.execute(run_id).await {
                error!(run_id = %run_id, error = %e, "Audit run aborted");
            }
        });
        (run, handle)
    }

    /// Run every stage of `run_id` in order, stopping at the first failure.
    ///
    /// Stage failures are recorded on the run and are not errors here; only a
    /// registry rejection (unknown run, illegal transition) is returned.
    pub async fn execute(&self, run_id: Uuid) -> Result<RunSnapshot, RegistryError> {
        let run = self.tracker.registry().get(run_id).await?;
        let mut state = PipelineState::default();

        for stage in self.stages.iter() {
            let stage_id = stage.id();
            self.tracker
                .transition(run_id, StageState::running(stage_id, 0))
                .await?;
            info!(run_id = %run_id, stage = %stage_id, "Stage started");

            let ctx = StageContext {
                run_id,
                audit_id: run.audit_id.clone(),
                audit_name: run.audit_name.clone(),
                progress: ProgressReporter::new(
                    self.tracker.clone(),
                    run_id,
                    stage_id,
                    self.stage_delay,
                ),
            };

            match self.run_stage(stage.as_ref(), &ctx, &state).await {
                Ok(update) => {
                    self.tracker
                        .transition(run_id, StageState::completed(stage_id))
                        .await?;
                    state.apply(update);
                    info!(run_id = %run_id, stage = %stage_id, "Stage completed");
                }
                Err(e) => {
                    let current = self.tracker.registry().get(run_id).await?;
                    let progress = current.stage(stage_id).map(|s| s.progress).unwrap_or(0);
                    warn!(run_id = %run_id, stage = %stage_id, error = %e, "Stage failed");
                    return self
                        .tracker
                        .transition(run_id, StageState::failed(stage_id, progress, e.to_string()))
                        .await;
                }
            }
        }

        let finished = self.tracker.registry().get(run_id).await?;
        info!(run_id = %run_id, status = %finished.status(), "Audit run finished");
        Ok(finished)
    }

    /// Run one stage and persist its output. A persistence failure fails the
    /// stage.
    async fn run_stage(
        &self,
        stage: &dyn Stage,
        ctx: &StageContext,
        state: &PipelineState,
    ) -> Result<StateUpdate, StageError> {
        let stage_id = stage.id();
        let output = stage.run(ctx, state).await?;

        let persistence = |e: crate::error::ArtifactError| StageError::Persistence {
            stage: stage_id,
            message: e.to_string(),
        };
        let artifacts = self.tracker.artifacts();
        artifacts
            .write_stage(
                ctx.run_id,
                stage_id,
                &output.log,
                &output.artifact_name,
                &output.payload,
            )
            .await
            .map_err(persistence)?;
        for (name, payload) in &output.extra_artifacts {
            artifacts
                .write_artifact(ctx.run_id, name, payload)
                .await
                .map_err(persistence)?;
        }
        Ok(output.update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::StageOutput;
    use crate::pipeline::types::{RunStatus, StageId, StageStatus};
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    /// A stage that reports some progress and then succeeds or fails.
    struct MockStage {
        id: StageId,
        fail_with: Option<String>,
        artifact_name: String,
    }

    impl MockStage {
        fn ok(id: StageId) -> Arc<dyn Stage> {
            Arc::new(Self {
                id,
                fail_with: None,
                artifact_name: id.as_str().to_string(),
            })
        }

        fn failing(id: StageId, message: &str) -> Arc<dyn Stage> {
            Arc::new(Self {
                id,
                fail_with: Some(message.to_string()),
                artifact_name: id.as_str().to_string(),
            })
        }

        fn bad_name(id: StageId) -> Arc<dyn Stage> {
            Arc::new(Self {
                id,
                fail_with: None,
                artifact_name: "../escape".to_string(),
            })
        }
    }

    #[async_trait]
    impl Stage for MockStage {
        fn id(&self) -> StageId {
            self.id
        }

        async fn run(
            &self,
            ctx: &StageContext,
            _state: &PipelineState,
        ) -> Result<StageOutput, StageError> {
            ctx.progress.checkpoint(40).await?;
            if let Some(message) = &self.fail_with {
                return Err(StageError::ExecutionFailed {
                    stage: self.id,
                    message: message.clone(),
                });
            }
            Ok(StageOutput {
                log: format!("{} done", self.id),
                artifact_name: self.artifact_name.clone(),
                payload: json!({"stage": self.id}),
                extra_artifacts: Vec::new(),
                update: StateUpdate::Policy(crate::policy::check_leave_policy(&[])),
            })
        }
    }

    fn executor(dir: &TempDir, stages: Vec<Arc<dyn Stage>>) -> PipelineExecutor {
        PipelineExecutor::new(
            RunRegistry::new(),
            ArtifactStore::new(dir.path()),
            stages,
            Duration::ZERO,
        )
    }

    fn all_ok() -> Vec<Arc<dyn Stage>> {
        StageId::ALL.into_iter().map(MockStage::ok).collect()
    }

    #[tokio::test]
    async fn test_all_stages_complete() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, all_ok());
        let (run, handle) = executor.submit("A-1", "Quarterly").await;
        handle.await.unwrap();

        let run = executor.registry().get(run.run_id).await.unwrap();
        assert_eq!(run.status(), RunStatus::Completed);
        assert!(run
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Completed && s.progress == 100));
        let pad = executor
            .artifacts()
            .read_scratchpad(run.run_id, StageId::PolicyCheck)
            .await
            .unwrap();
        assert_eq!(pad, "policy_check done");
    }

    #[tokio::test]
    async fn test_failure_halts_later_stages() {
        let dir = TempDir::new().unwrap();
        let mut stages = all_ok();
        stages[2] = MockStage::failing(StageId::RulesEngine, "rules exploded");
        let executor = executor(&dir, stages);

        let (run, handle) = executor.submit("A-2", "Broken").await;
        handle.await.unwrap();

        let run = executor.registry().get(run.run_id).await.unwrap();
        assert_eq!(run.status(), RunStatus::Error);
        assert_eq!(run.stages[0].status, StageStatus::Completed);
        assert_eq!(run.stages[1].status, StageStatus::Completed);
        let failed = &run.stages[2];
        assert_eq!(failed.status, StageStatus::Error);
        assert_eq!(failed.progress, 40);
        assert!(failed.error_message.as_deref().unwrap().contains("rules exploded"));
        assert_eq!(run.stages[3].status, StageStatus::Pending);
        assert_eq!(run.stages[4].status, StageStatus::Pending);
    }

    #[tokio::test]
    async fn test_persistence_failure_fails_stage() {
        let dir = TempDir::new().unwrap();
        let mut stages = all_ok();
        stages[0] = MockStage::bad_name(StageId::DataIntegrator);
        let executor = executor(&dir, stages);

        let (run, handle) = executor.submit("A-3", "Bad artifact").await;
        handle.await.unwrap();

        let run = executor.registry().get(run.run_id).await.unwrap();
        assert_eq!(run.stages[0].status, StageStatus::Error);
        assert!(run.stages[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("could not persist"));
        assert_eq!(run.stages[1].status, StageStatus::Pending);
    }

    #[tokio::test]
    async fn test_manifest_tracks_final_state() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, all_ok());
        let (run, handle) = executor.submit("A-4", "Manifest").await;
        handle.await.unwrap();

        let manifests = executor.artifacts().load_manifests().await.unwrap();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0].run_id, run.run_id);
        assert_eq!(manifests[0].status(), RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_runs_execute_independently() {
        let dir = TempDir::new().unwrap();
        let ok = executor(&dir, all_ok());
        let mut stages = all_ok();
        stages[0] = MockStage::failing(StageId::DataIntegrator, "no data");
        let broken = PipelineExecutor::new(
            ok.registry().clone(),
            ok.artifacts().clone(),
            stages,
            Duration::ZERO,
        );

        let mut handles = Vec::new();
        let mut good_ids = Vec::new();
        for i in 0..4 {
            let (run, handle) = ok.submit(format!("G-{i}"), "good").await;
            good_ids.push(run.run_id);
            handles.push(handle);
        }
        let (bad, handle) = broken.submit("B-1", "bad").await;
        handles.push(handle);
        for handle in handles {
            handle.await.unwrap();
        }

        for id in good_ids {
            assert_eq!(ok.registry().get(id).await.unwrap().status(), RunStatus::Completed);
        }
        assert_eq!(ok.registry().get(bad.run_id).await.unwrap().status(), RunStatus::Error);
        assert_eq!(ok.registry().list().await.len(), 5);
    }

    #[tokio::test]
    async fn test_execute_unknown_run() {
        let dir = TempDir::new().unwrap();
        let executor = executor(&dir, all_ok());
        let err = executor.execute(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, RegistryError::RunNotFound { .. }));
    }
}
