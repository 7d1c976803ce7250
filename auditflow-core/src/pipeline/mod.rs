//! Audit pipeline: a fixed, linear sequence of stages executed per run.
//!
//! Runs are registered in the [`RunRegistry`], executed by the
//! [`PipelineExecutor`] on their own tokio task, and observed through
//! registry snapshots.

pub mod executor;
pub mod progress;
pub mod registry;
pub mod stages;
pub mod types;

pub use executor::PipelineExecutor;
pub use progress::{ProgressReporter, RunTracker};
pub use registry::{RunRegistry, parse_run_id};
pub use stages::{
    DataIntegratorStage, NormalizerStage, PipelineState, PolicyCheckStage, RulesEngineStage,
    Stage, StageContext, StageOutput, StateUpdate, SummaryStage, default_stages,
};
pub use types::{
    RunSnapshot, RunStatus, RunSummary, StageDescriptor, StageId, StageState, StageStatus,
};
