//! Pipeline type definitions: the fixed stage list, stage and run status,
//! and the snapshots handed out by the run registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::RegistryError;

/// One step of the audit pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    DataIntegrator,
    Normalizer,
    RulesEngine,
    PolicyCheck,
    Summary,
}

impl StageId {
    /// Every stage, in the order the executor runs them.
    pub const ALL: [StageId; 5] = [
        StageId::DataIntegrator,
        StageId::Normalizer,
        StageId::RulesEngine,
        StageId::PolicyCheck,
        StageId::Summary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::DataIntegrator => "data_integrator",
            StageId::Normalizer => "normalizer",
            StageId::RulesEngine => "rules_engine",
            StageId::PolicyCheck => "policy_check",
            StageId::Summary => "summary",
        }
    }

    /// Position of this stage in [`StageId::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-facing stage name.
    pub fn display_name(self) -> &'static str {
        match self {
            StageId::DataIntegrator => "Data Integrator",
            StageId::Normalizer => "Normalize Data",
            StageId::RulesEngine => "Run Rules",
            StageId::PolicyCheck => "Policy Check",
            StageId::Summary => "Summary",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            StageId::DataIntegrator => "Fetches data from sources and aggregates.",
            StageId::Normalizer => "Standardizes columns and types.",
            StageId::RulesEngine => "Detects duplicates, mismatches, and investigations.",
            StageId::PolicyCheck => "Validates records against the leave policy.",
            StageId::Summary => "Findings, risks, and recommendations.",
        }
    }

    pub fn descriptor(self) -> StageDescriptor {
        StageDescriptor {
            id: self,
            name: self.display_name(),
            description: self.description(),
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| RegistryError::UnknownStage {
                stage: s.to_string(),
            })
    }
}

/// Static metadata describing a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageDescriptor {
    pub id: StageId,
    pub name: &'static str,
    pub description: &'static str,
}

/// Lifecycle status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl StageStatus {
    /// Whether the stage has reached a final state.
    pub fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Error)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::Running => write!(f, "running"),
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Error => write!(f, "error"),
        }
    }
}

/// Live state of one stage within one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageState {
    pub stage_id: StageId,
    pub status: StageStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StageState {
    pub fn pending(stage_id: StageId) -> Self {
        Self {
            stage_id,
            status: StageStatus::Pending,
            progress: 0,
            timestamp: None,
            error_message: None,
        }
    }

    /// A running state at the given progress, stamped now.
    pub fn running(stage_id: StageId, progress: u8) -> Self {
        Self {
            stage_id,
            status: StageStatus::Running,
            progress: progress.min(100),
            timestamp: Some(Utc::now()),
            error_message: None,
        }
    }

    pub fn completed(stage_id: StageId) -> Self {
        Self {
            stage_id,
            status: StageStatus::Completed,
            progress: 100,
            timestamp: Some(Utc::now()),
            error_message: None,
        }
    }

    /// An error state; progress is carried over from the running state.
    pub fn failed(stage_id: StageId, progress: u8, message: impl Into<String>) -> Self {
        Self {
            stage_id,
            status: StageStatus::Error,
            progress,
            timestamp: Some(Utc::now()),
            error_message: Some(message.into()),
        }
    }
}

/// Status of a whole run, always derived from its stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl RunStatus {
    /// Derive a run status from its stage states.
    ///
    /// `error` wins over everything, `completed` requires every stage to be
    /// completed, and a run that has started any stage counts as `running`
    /// until it reaches one of those two.
    pub fn derive(stages: &[StageState]) -> Self {
        if stages.iter().any(|s| s.status == StageStatus::Error) {
            RunStatus::Error
        } else if !stages.is_empty() && stages.iter().all(|s| s.status == StageStatus::Completed)
        {
            RunStatus::Completed
        } else if stages.iter().any(|s| s.status != StageStatus::Pending) {
            RunStatus::Running
        } else {
            RunStatus::Pending
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Error => write!(f, "error"),
        }
    }
}

/// A consistent copy of one run, taken under the run's lock.
///
/// This is also the on-disk `run.json` manifest format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: Uuid,
    pub audit_id: String,
    pub audit_name: String,
    pub created_at: DateTime<Utc>,
    /// One entry per [`StageId::ALL`], in order.
    pub stages: Vec<StageState>,
}

impl RunSnapshot {
    /// A fresh run with every stage pending.
    pub fn new(audit_id: impl Into<String>, audit_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            audit_id: audit_id.into(),
            audit_name: audit_name.into(),
            created_at: Utc::now(),
            stages: StageId::ALL.into_iter().map(StageState::pending).collect(),
        }
    }

    pub fn status(&self) -> RunStatus {
        RunStatus::derive(&self.stages)
    }

    pub fn stage(&self, stage_id: StageId) -> Option<&StageState> {
        self.stages.get(stage_id.index())
    }

    /// The first error message recorded on any stage.
    pub fn error_message(&self) -> Option<&str> {
        self.stages
            .iter()
            .find_map(|s| s.error_message.as_deref())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            audit_id: self.audit_id.clone(),
            audit_name: self.audit_name.clone(),
            created_at: self.created_at,
            status: self.status(),
        }
    }
}

/// Row of the run listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub audit_id: String,
    pub audit_name: String,
    pub created_at: DateTime<Utc>,
    pub status: RunStatus,
}
