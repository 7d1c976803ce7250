//! Run registry: the concurrent store of run metadata and live stage state.
//!
//! The outer map sits behind an `RwLock` that is only write-locked to insert a
//! run. Each run has its own `Mutex`, so executors updating different runs never
//! contend, and readers always copy a whole run at once.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::pipeline::types::{RunSnapshot, RunStatus, RunSummary, StageState, StageStatus};

const INTERRUPTED_MESSAGE: &str = "run interrupted before completion";

#[derive(Default)]
struct RegistryInner {
    /// Run ids in insertion order.
    order: Vec<Uuid>,
    runs: HashMap<Uuid, Arc<Mutex<RunSnapshot>>>,
}

/// Shared handle to the run registry. Cloning is cheap; all clones see the
/// same runs.
#[derive(Clone, Default)]
pub struct RunRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl std::fmt::Debug for RunRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRegistry").finish_non_exhaustive()
    }
}

/// Parse an external run id. Anything that is not a UUID cannot name a run.
pub fn parse_run_id(raw: &str) -> Result<Uuid, RegistryError> {
    Uuid::parse_str(raw).map_err(|_| RegistryError::RunNotFound {
        run_id: raw.to_string(),
    })
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run with every stage pending and return its snapshot.
    pub async fn create(
        &self,
        audit_id: impl Into<String>,
        audit_name: impl Into<String>,
    ) -> RunSnapshot {
        let run = RunSnapshot::new(audit_id, audit_name);
        let mut inner = self.inner.write().await;
        inner.order.push(run.run_id);
        inner
            .runs
            .insert(run.run_id, Arc::new(Mutex::new(run.clone())));
        debug!(run_id = %run.run_id, "Registered run");
        run
    }

    /// Re-register a run read back from its manifest.
    ///
    /// No task drives a restored run, so a run that had not finished when its
    /// manifest was written is closed out: the first stage that is neither
    /// completed nor failed becomes an error. Runs are ordered by creation time
    /// relative to the runs already present.
    pub async fn restore(&self, mut run: RunSnapshot) -> Result<RunSnapshot, RegistryError> {
        let unfinished = !matches!(run.status(), RunStatus::Completed | RunStatus::Error);
        if unfinished {
            if let Some(stage) = run.stages.iter_mut().find(|s| !s.status.is_terminal()) {
                *stage = StageState::failed(stage.stage_id, stage.progress, INTERRUPTED_MESSAGE);
            }
        }

        let mut inner = self.inner.write().await;
        if inner.runs.contains_key(&run.run_id) {
            return Err(RegistryError::AlreadyRegistered { run_id: run.run_id });
        }

        let mut position = inner.order.len();
        for (i, id) in inner.order.iter().enumerate() {
            if let Some(existing) = inner.runs.get(id) {
                if existing.lock().await.created_at > run.created_at {
                    position = i;
                    break;
                }
            }
        }
        inner.order.insert(position, run.run_id);
        inner
            .runs
            .insert(run.run_id, Arc::new(Mutex::new(run.clone())));
        Ok(run)
    }

    async fn entry(&self, run_id: Uuid) -> Result<Arc<Mutex<RunSnapshot>>, RegistryError> {
        let inner = self.inner.read().await;
        inner
            .runs
            .get(&run_id)
            .cloned()
            .ok_or_else(|| RegistryError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }

    /// A consistent copy of one run.
    pub async fn get(&self, run_id: Uuid) -> Result<RunSnapshot, RegistryError> {
        let entry = self.entry(run_id).await?;
        let run = entry.lock().await;
        Ok(run.clone())
    }

    /// All runs, most recently created first.
    pub async fn list(&self) -> Vec<RunSummary> {
        let entries: Vec<_> = {
            let inner = self.inner.read().await;
            inner
                .order
                .iter()
                .rev()
                .filter_map(|id| inner.runs.get(id).cloned())
                .collect()
        };

        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            summaries.push(entry.lock().await.summary());
        }
        summaries
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.runs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Replace one stage's state, enforcing the stage lifecycle.
    ///
    /// This is the only way stage data changes. Returns the run as it is after
    /// the update.
    pub async fn set_stage_state(
        &self,
        run_id: Uuid,
        state: StageState,
    ) -> Result<RunSnapshot, RegistryError> {
        let entry = self.entry(run_id).await?;
        let mut run = entry.lock().await;
        check_transition(&run, &state)?;

        let mut state = state;
        if state.status == StageStatus::Completed {
            state.progress = 100;
        }
        debug!(
            run_id = %run_id,
            stage = %state.stage_id,
            status = %state.status,
            progress = state.progress,
            "Stage transition"
        );
        let idx = state.stage_id.index();
        run.stages[idx] = state;
        Ok(run.clone())
    }
}

fn check_transition(run: &RunSnapshot, next: &StageState) -> Result<(), RegistryError> {
    let idx = next.stage_id.index();
    let current = &run.stages[idx];

    match (current.status, next.status) {
        (StageStatus::Pending, StageStatus::Running) => {
            if let Some(blocker) = run.stages[..idx]
                .iter()
                .find(|s| s.status != StageStatus::Completed)
            {
                return Err(RegistryError::OutOfOrder {
                    stage: next.stage_id,
                    reason: format!("stage '{}' is {}", blocker.stage_id, blocker.status),
                });
            }
            Ok(())
        }
        (StageStatus::Running, StageStatus::Running) => {
            if next.progress < current.progress {
                return Err(RegistryError::ProgressRegressed {
                    stage: next.stage_id,
                    from: current.progress,
                    to: next.progress,
                });
            }
            Ok(())
        }
        (StageStatus::Running, StageStatus::Completed | StageStatus::Error) => Ok(()),
        (from, to) => Err(RegistryError::InvalidStateTransition {
            stage: next.stage_id,
            from,
            to,
        }),
    }
}
