//! Error types for the Auditflow core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering dataset loading, stage execution, the run registry, the artifact
//! store, and configuration.

use std::path::PathBuf;
use uuid::Uuid;

use crate::pipeline::types::{StageId, StageStatus};

/// Top-level error type for the Auditflow core library.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Data load error: {0}")]
    DataLoad(#[from] DataLoadError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AuditError {
    /// Whether this error means the queried run, stage, or artifact does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AuditError::Registry(RegistryError::RunNotFound { .. })
                | AuditError::Registry(RegistryError::UnknownStage { .. })
                | AuditError::Artifact(ArtifactError::NotFound { .. })
        )
    }
}

/// Errors from acquiring the employee dataset.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("Dataset not found: {path}")]
    DatasetMissing { path: PathBuf },

    #[error("Dataset unreadable at {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("Dataset is missing required columns: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    #[error("Malformed row {row}: {message}")]
    MalformedRow { row: usize, message: String },
}

/// Errors raised while a pipeline stage runs.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    DataLoad(#[from] DataLoadError),

    #[error("Stage '{stage}' requires output from '{requires}', which is not available")]
    MissingInput { stage: StageId, requires: StageId },

    #[error("Stage '{stage}' failed: {message}")]
    ExecutionFailed { stage: StageId, message: String },

    #[error("Stage '{stage}' could not persist its output: {message}")]
    Persistence { stage: StageId, message: String },
}

/// Errors from the run registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Unknown stage: {stage}")]
    UnknownStage { stage: String },

    #[error("Invalid state transition for stage '{stage}': {from} -> {to}")]
    InvalidStateTransition {
        stage: StageId,
        from: StageStatus,
        to: StageStatus,
    },

    #[error("Stage '{stage}' cannot start: {reason}")]
    OutOfOrder { stage: StageId, reason: String },

    #[error("Progress for stage '{stage}' cannot go from {from}% back to {to}%")]
    ProgressRegressed { stage: StageId, from: u8, to: u8 },

    #[error("Run already registered: {run_id}")]
    AlreadyRegistered { run_id: Uuid },
}

/// Errors from the per-run artifact store.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("{kind} not found for run {run_id}: {name}")]
    NotFound {
        run_id: String,
        kind: &'static str,
        name: String,
    },

    #[error("Artifact I/O failed at {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Artifact at {path} is not valid JSON: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// A type alias for results using the top-level `AuditError`.
pub type Result<T> = std::result::Result<T, AuditError>;
