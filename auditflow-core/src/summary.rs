//! Final audit summary: aggregate counts plus risk and recommendation text.

use serde::{Deserialize, Serialize};

use crate::policy::{LEAVE_STREAK_LIMIT, PolicyOutcome};
use crate::rules::{InvestigationRollup, MismatchCounts, RulesOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Findings {
    pub normalized_row_count: usize,
    pub duplicates_removed: usize,
    pub final_row_count: usize,
    pub mismatch_counts: MismatchCounts,
    pub job_allocation_issues: usize,
    pub policy_violations: usize,
    pub investigation_rollup: InvestigationRollup,
    pub total_issues: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub findings: Findings,
    pub risks: Vec<String>,
    pub recommendations: Vec<String>,
}

impl AuditSummary {
    pub fn build(rules: &RulesOutcome, policy: &PolicyOutcome) -> Self {
        let findings = Findings {
            normalized_row_count: rules.normalized_row_count,
            duplicates_removed: rules.duplicates_removed,
            final_row_count: rules.final_row_count,
            mismatch_counts: rules.mismatch_counts,
            job_allocation_issues: rules.job_allocation_issues.len(),
            policy_violations: policy.violations.len(),
            investigation_rollup: rules.investigation_rollup.clone(),
            total_issues: rules.duplicates_removed
                + rules.mismatch_counts.total()
                + rules.job_allocation_issues.len()
                + policy.violations.len(),
        };
        let (risks, recommendations) = assess(&findings);
        Self {
            findings,
            risks,
            recommendations,
        }
    }
}

fn assess(findings: &Findings) -> (Vec<String>, Vec<String>) {
    let mut risks = Vec::new();
    let mut recommendations = Vec::new();

    if findings.duplicates_removed > 0 || findings.mismatch_counts.total() > 0 {
        risks.push(format!(
            "Data inconsistency across source systems: {} duplicate rows, \
             {} conflicting field values",
            findings.duplicates_removed,
            findings.mismatch_counts.total()
        ));
        recommendations
            .push("Establish a single source of truth for employee master data".to_string());
    }
    if findings.mismatch_counts.bonus > 0 || findings.mismatch_counts.paygrade > 0 {
        risks.push("Payroll exposure from conflicting bonus or paygrade records".to_string());
        recommendations
            .push("Have managers confirm bonus and paygrade for flagged employees".to_string());
    }
    if findings.policy_violations > 0 {
        risks.push(format!(
            "Leave policy non-compliance: {} employees above the \
             {LEAVE_STREAK_LIMIT}-day streak limit",
            findings.policy_violations
        ));
        recommendations
            .push("Review extended leave approvals with the affected managers".to_string());
    }
    if findings.job_allocation_issues > 0 {
        risks.push(format!(
            "Job allocation gaps for {} employees weaken org structure reporting",
            findings.job_allocation_issues
        ));
        recommendations.push("Assign every employee to a department or team".to_string());
    }
    let rollup = &findings.investigation_rollup;
    if rollup.past_flagged > 0 || rollup.ongoing > 0 {
        risks.push(format!(
            "Open compliance exposure: {} past-flagged and {} ongoing investigations",
            rollup.past_flagged, rollup.ongoing
        ));
        recommendations
            .push("Fold investigation status into the performance review workflow".to_string());
    }
    if rollup.missing + rollup.unrecognized > 0 {
        recommendations.push(format!(
            "Correct {} records with a missing or unrecognized investigation status",
            rollup.missing + rollup.unrecognized
        ));
    }
    if risks.is_empty() {
        recommendations.push("No issues found; keep the monthly audit cadence".to_string());
    }

    (risks, recommendations)
}
