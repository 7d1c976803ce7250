//! Read-only views over the run registry and artifact store, shaped for the
//! HTTP API and the CLI.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::artifacts::ArtifactStore;
use crate::error::AuditError;
use crate::pipeline::registry::{RunRegistry, parse_run_id};
use crate::pipeline::types::{
    RunSnapshot, RunStatus, RunSummary, StageId, StageState, StageStatus,
};

/// One stage as it appears in a status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageView {
    pub status: StageStatus,
    pub progress: u8,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&StageState> for StageView {
    fn from(state: &StageState) -> Self {
        Self {
            status: state.status,
            progress: state.progress,
            timestamp: state.timestamp,
            error: state.error_message.clone(),
        }
    }
}

/// Response of a run status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunStatusView {
    pub run_id: Uuid,
    pub audit_id: String,
    pub audit_name: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Keyed by stage id, in pipeline order.
    pub stages: BTreeMap<StageId, StageView>,
}

impl From<&RunSnapshot> for RunStatusView {
    fn from(run: &RunSnapshot) -> Self {
        Self {
            run_id: run.run_id,
            audit_id: run.audit_id.clone(),
            audit_name: run.audit_name.clone(),
            status: run.status(),
            error: run.error_message().map(str::to_string),
            stages: run
                .stages
                .iter()
                .map(|s| (s.stage_id, StageView::from(s)))
                .collect(),
        }
    }
}

/// Stage metadata joined with live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub id: StageId,
    pub name: &'static str,
    pub description: &'static str,
    pub state: StageView,
}

#[derive(Debug, Clone)]
pub struct StatusReporter {
    registry: RunRegistry,
    artifacts: ArtifactStore,
}

impl StatusReporter {
    pub fn new(registry: RunRegistry, artifacts: ArtifactStore) -> Self {
        Self {
            registry,
            artifacts,
        }
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    async fn snapshot(&self, run_id: &str) -> Result<RunSnapshot, AuditError> {
        let id = parse_run_id(run_id)?;
        Ok(self.registry.get(id).await?)
    }

    pub async fn list(&self) -> Vec<RunSummary> {
        self.registry.list().await
    }

    pub async fn status(&self, run_id: &str) -> Result<RunStatusView, AuditError> {
        let run = self.snapshot(run_id).await?;
        Ok(RunStatusView::from(&run))
    }

    /// Every stage in pipeline order, with its metadata and current state.
    pub async fn nodes(&self, run_id: &str) -> Result<Vec<NodeView>, AuditError> {
        let run = self.snapshot(run_id).await?;
        Ok(run
            .stages
            .iter()
            .map(|state| {
                let meta = state.stage_id.descriptor();
                NodeView {
                    id: meta.id,
                    name: meta.name,
                    description: meta.description,
                    state: StageView::from(state),
                }
            })
            .collect())
    }

    /// Log text of one stage. A stage that has not written its log yet is
    /// NotFound, same as an unknown stage.
    pub async fn scratchpad(&self, run_id: &str, stage: &str) -> Result<String, AuditError> {
        let run = self.snapshot(run_id).await?;
        let stage_id: StageId = stage.parse()?;
        Ok(self.artifacts.read_scratchpad(run.run_id, stage_id).await?)
    }

    /// Raw JSON text of a named artifact, byte-for-byte as stored.
    pub async fn artifact(&self, run_id: &str, name: &str) -> Result<String, AuditError> {
        let run = self.snapshot(run_id).await?;
        Ok(self.artifacts.read_artifact_raw(run.run_id, name).await?)
    }
}
