//! # Auditflow Core
//!
//! Core library for the Auditflow HR audit pipeline.
//! Provides the dataset loader, the data-quality rules engine, the leave
//! policy checker, the staged pipeline executor with its run registry, the
//! per-run artifact store, configuration, and the HTTP API.

pub mod alerts;
pub mod artifacts;
pub mod config;
pub mod dataset;
pub mod error;
pub mod persistence;
pub mod pipeline;
pub mod policy;
pub mod reporter;
pub mod rules;
pub mod server;
pub mod summary;

// Re-export commonly used types at the crate root.
pub use artifacts::ArtifactStore;
pub use config::{AuditConfig, ConfigOverrides, load_config};
pub use dataset::{CsvDatasetSource, DatasetSource, EmployeeRecord, InMemorySource, RawTable};
pub use error::{
    ArtifactError, AuditError, ConfigError, DataLoadError, RegistryError, Result, StageError,
};
pub use pipeline::{
    PipelineExecutor, RunRegistry, RunSnapshot, RunStatus, RunSummary, StageId, StageState,
    StageStatus,
};
pub use policy::{LEAVE_STREAK_LIMIT, PolicyOutcome, PolicyViolation};
pub use reporter::{NodeView, RunStatusView, StatusReporter};
pub use rules::RulesOutcome;
pub use server::{AppState, router};
pub use summary::AuditSummary;
