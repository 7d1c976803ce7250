//! The five audit stages.
//!
//! A stage reads the state accumulated by earlier stages and returns a typed
//! [`StateUpdate`] together with its log text and JSON artifact. Stages never
//! touch the registry or the artifact store directly; the executor persists
//! their output and applies the update.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

use crate::alerts::{ManagerAlert, job_allocation_alerts, leave_policy_alerts, mismatch_alerts};
use crate::dataset::{
    ConversionErrors, DatasetSource, EmployeeRecord, REQUIRED_COLUMNS, RawTable, normalize,
};
use crate::error::StageError;
use crate::pipeline::progress::ProgressReporter;
use crate::pipeline::types::StageId;
use crate::policy::{LEAVE_STREAK_LIMIT, PolicyOutcome, check_leave_policy};
use crate::rules::{RulesOutcome, evaluate};
use crate::summary::AuditSummary;

/// Number of final records copied into rules and policy artifacts.
const SAMPLE_SIZE: usize = 5;

/// Per-stage view of the run being executed.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub run_id: Uuid,
    pub audit_id: String,
    pub audit_name: String,
    pub progress: ProgressReporter,
}

/// What a stage hands back to the executor.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub log: String,
    pub artifact_name: String,
    pub payload: Value,
    /// Additional named artifacts written alongside the main one.
    pub extra_artifacts: Vec<(String, Value)>,
    pub update: StateUpdate,
}

/// The typed contribution of one stage to the pipeline state.
#[derive(Debug, Clone)]
pub enum StateUpdate {
    Loaded(RawTable),
    Normalized {
        records: Vec<EmployeeRecord>,
        conversion_errors: ConversionErrors,
    },
    Rules {
        outcome: RulesOutcome,
        final_records: Vec<EmployeeRecord>,
    },
    Policy(PolicyOutcome),
    Summary(AuditSummary),
}

/// State accumulated across the stages of one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub raw: Option<RawTable>,
    pub records: Option<Vec<EmployeeRecord>>,
    pub conversion_errors: ConversionErrors,
    pub rules: Option<RulesOutcome>,
    pub final_records: Option<Vec<EmployeeRecord>>,
    pub policy: Option<PolicyOutcome>,
    pub summary: Option<AuditSummary>,
}

impl PipelineState {
    pub fn apply(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Loaded(table) => self.raw = Some(table),
            StateUpdate::Normalized {
                records,
                conversion_errors,
            } => {
                self.records = Some(records);
                self.conversion_errors = conversion_errors;
            }
            StateUpdate::Rules {
                outcome,
                final_records,
            } => {
                self.rules = Some(outcome);
                self.final_records = Some(final_records);
            }
            StateUpdate::Policy(outcome) => self.policy = Some(outcome),
            StateUpdate::Summary(summary) => self.summary = Some(summary),
        }
    }
}

/// One step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    async fn run(&self, ctx: &StageContext, state: &PipelineState)
    -> Result<StageOutput, StageError>;
}

fn require<'a, T>(
    value: &'a Option<T>,
    stage: StageId,
    requires: StageId,
) -> Result<&'a T, StageError> {
    value
        .as_ref()
        .ok_or(StageError::MissingInput { stage, requires })
}

fn to_payload<T: Serialize>(stage: StageId, value: &T) -> Result<Value, StageError> {
    serde_json::to_value(value).map_err(|e| StageError::ExecutionFailed {
        stage,
        message: format!("could not serialize artifact: {e}"),
    })
}

fn sample(records: &[EmployeeRecord]) -> &[EmployeeRecord] {
    &records[..records.len().min(SAMPLE_SIZE)]
}

/// Loads the raw table from the configured dataset source.
pub struct DataIntegratorStage {
    source: Arc<dyn DatasetSource>,
}

impl DataIntegratorStage {
    pub fn new(source: Arc<dyn DatasetSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Stage for DataIntegratorStage {
    fn id(&self) -> StageId {
        StageId::DataIntegrator
    }

    async fn run(
        &self,
        ctx: &StageContext,
        _state: &PipelineState,
    ) -> Result<StageOutput, StageError> {
        ctx.progress.checkpoint(10).await?;
        let table = self.source.load().await?;
        ctx.progress.checkpoint(60).await?;

        let unique = table.unique_emp_ids();
        let log = [
            format!("Source: {}", self.source.describe()),
            format!("Loaded {} rows with {} columns", table.len(), table.columns.len()),
            format!("Columns: {}", table.columns.join(", ")),
            format!("Unique employee ids: {unique}"),
        ]
        .join("\n");
        let payload = json!({
            "rows": table.len(),
            "columns": table.columns,
            "unique_emp_ids": unique,
        });
        ctx.progress.checkpoint(90).await?;

        Ok(StageOutput {
            log,
            artifact_name: "data_integrator_output".to_string(),
            payload,
            extra_artifacts: Vec::new(),
            update: StateUpdate::Loaded(table),
        })
    }
}

/// Types and trims the raw rows.
pub struct NormalizerStage;

#[async_trait]
impl Stage for NormalizerStage {
    fn id(&self) -> StageId {
        StageId::Normalizer
    }

    async fn run(
        &self,
        ctx: &StageContext,
        state: &PipelineState,
    ) -> Result<StageOutput, StageError> {
        let table = require(&state.raw, self.id(), StageId::DataIntegrator)?;
        ctx.progress.checkpoint(30).await?;
        let (records, conversion_errors) = normalize(table);
        ctx.progress.checkpoint(60).await?;

        let mut log = vec![
            format!("Normalized {} rows", records.len()),
            "Trimmed text fields; cast bonus and leave_days_max_streak to integers".to_string(),
        ];
        if conversion_errors.total() > 0 {
            log.push(format!(
                "Coerced to 0: {} bonus values, {} leave streak values",
                conversion_errors.bonus, conversion_errors.leave_days_max_streak
            ));
        }
        let payload = json!({
            "rows": records.len(),
            "columns": REQUIRED_COLUMNS,
            "conversion_errors": conversion_errors,
        });

        Ok(StageOutput {
            log: log.join("\n"),
            artifact_name: "normalized_snapshot".to_string(),
            payload,
            extra_artifacts: Vec::new(),
            update: StateUpdate::Normalized {
                records,
                conversion_errors,
            },
        })
    }
}

#[derive(Serialize)]
struct RulesArtifact<'a> {
    #[serde(flatten)]
    outcome: &'a RulesOutcome,
    alerts: Vec<ManagerAlert>,
    sample_final_data: &'a [EmployeeRecord],
}

/// Deduplication, mismatch detection, allocation and investigation checks.
pub struct RulesEngineStage;

#[async_trait]
impl Stage for RulesEngineStage {
    fn id(&self) -> StageId {
        StageId::RulesEngine
    }

    async fn run(
        &self,
        ctx: &StageContext,
        state: &PipelineState,
    ) -> Result<StageOutput, StageError> {
        let records = require(&state.records, self.id(), StageId::Normalizer)?;
        ctx.progress.checkpoint(20).await?;
        let (outcome, final_records) = evaluate(records);
        ctx.progress.checkpoint(70).await?;

        let mut alerts = mismatch_alerts(records, &outcome.mismatches);
        alerts.extend(job_allocation_alerts(&final_records));

        let counts = &outcome.mismatch_counts;
        let rollup = &outcome.investigation_rollup;
        let mut log = vec![
            format!(
                "Duplicates removed: {} ({} groups)",
                outcome.duplicates_removed,
                outcome.duplicate_groups.len()
            ),
            format!("Final rows: {}", outcome.final_row_count),
            format!(
                "Mismatches: position={} bonus={} paygrade={}",
                counts.position, counts.bonus, counts.paygrade
            ),
            format!(
                "Job allocation issues: {}",
                outcome.job_allocation_issues.len()
            ),
            format!(
                "Investigations: past_cleared={} past_flagged={} ongoing={} missing={} \
                 unrecognized={}",
                rollup.past_cleared,
                rollup.past_flagged,
                rollup.ongoing,
                rollup.missing,
                rollup.unrecognized
            ),
        ];
        log.extend(alerts.iter().map(|a| format!("Drafted alert to {}: {}", a.to, a.subject)));

        let payload = to_payload(
            self.id(),
            &RulesArtifact {
                outcome: &outcome,
                alerts,
                sample_final_data: sample(&final_records),
            },
        )?;

        Ok(StageOutput {
            log: log.join("\n"),
            artifact_name: "rules_results".to_string(),
            payload,
            extra_artifacts: Vec::new(),
            update: StateUpdate::Rules {
                outcome,
                final_records,
            },
        })
    }
}

#[derive(Serialize)]
struct PolicyArtifact<'a> {
    #[serde(flatten)]
    outcome: &'a PolicyOutcome,
    leave_streak_limit: i64,
    compliance_rate: f64,
    alerts: Vec<ManagerAlert>,
    sample_final_data: &'a [EmployeeRecord],
}

/// Leave streak check over the deduplicated records.
pub struct PolicyCheckStage;

#[async_trait]
impl Stage for PolicyCheckStage {
    fn id(&self) -> StageId {
        StageId::PolicyCheck
    }

    async fn run(
        &self,
        ctx: &StageContext,
        state: &PipelineState,
    ) -> Result<StageOutput, StageError> {
        let final_records = require(&state.final_records, self.id(), StageId::RulesEngine)?;
        ctx.progress.checkpoint(40).await?;
        let outcome = check_leave_policy(final_records);
        let alerts = leave_policy_alerts(&outcome.violations);
        ctx.progress.checkpoint(80).await?;

        let mut log = vec![
            format!(
                "Checked {} records against the {LEAVE_STREAK_LIMIT}-day leave limit",
                outcome.checked
            ),
            format!("Violations: {}", outcome.violations.len()),
        ];
        log.extend(alerts.iter().map(|a| format!("Drafted alert to {}: {}", a.to, a.subject)));

        let payload = to_payload(
            self.id(),
            &PolicyArtifact {
                outcome: &outcome,
                leave_streak_limit: LEAVE_STREAK_LIMIT,
                compliance_rate: outcome.compliance_rate(),
                alerts,
                sample_final_data: sample(final_records),
            },
        )?;

        Ok(StageOutput {
            log: log.join("\n"),
            artifact_name: "policy_results".to_string(),
            payload,
            extra_artifacts: Vec::new(),
            update: StateUpdate::Policy(outcome),
        })
    }
}

/// Aggregates findings and writes the run's `audit_report`.
pub struct SummaryStage;

#[async_trait]
impl Stage for SummaryStage {
    fn id(&self) -> StageId {
        StageId::Summary
    }

    async fn run(
        &self,
        ctx: &StageContext,
        state: &PipelineState,
    ) -> Result<StageOutput, StageError> {
        let rules = require(&state.rules, self.id(), StageId::RulesEngine)?;
        let policy = require(&state.policy, self.id(), StageId::PolicyCheck)?;
        ctx.progress.checkpoint(50).await?;

        let summary = AuditSummary::build(rules, policy);
        let findings = &summary.findings;
        let mut log = vec![
            format!("Audit: {} ({})", ctx.audit_name, ctx.audit_id),
            format!(
                "Rows: {} normalized, {} final, {} duplicates removed",
                findings.normalized_row_count, findings.final_row_count, findings.duplicates_removed
            ),
            format!("Total issues: {}", findings.total_issues),
        ];
        log.extend(summary.risks.iter().map(|r| format!("Risk: {r}")));
        log.extend(
            summary
                .recommendations
                .iter()
                .map(|r| format!("Recommendation: {r}")),
        );

        let payload = to_payload(self.id(), &summary)?;
        let report = json!({
            "run_id": ctx.run_id,
            "audit_id": ctx.audit_id,
            "audit_name": ctx.audit_name,
            "generated_at": Utc::now(),
            "summary": payload,
            "rules": to_payload(self.id(), rules)?,
            "policy": to_payload(self.id(), policy)?,
        });

        Ok(StageOutput {
            log: log.join("\n"),
            artifact_name: "summary".to_string(),
            payload,
            extra_artifacts: vec![("audit_report".to_string(), report)],
            update: StateUpdate::Summary(summary),
        })
    }
}

/// The production stage list, in [`StageId::ALL`] order.
pub fn default_stages(source: Arc<dyn DatasetSource>) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(DataIntegratorStage::new(source)),
        Arc::new(NormalizerStage),
        Arc::new(RulesEngineStage),
        Arc::new(PolicyCheckStage),
        Arc::new(SummaryStage),
    ]
}
