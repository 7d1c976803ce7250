//! Drafted manager notifications. Nothing is sent; drafts land in artifacts.

use serde::{Deserialize, Serialize};

use crate::dataset::EmployeeRecord;
use crate::policy::{LEAVE_STREAK_LIMIT, PolicyViolation};
use crate::rules::{Mismatch, is_allocation_missing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Mismatch,
    JobAllocation,
    LeavePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerAlert {
    pub kind: AlertKind,
    pub to: String,
    pub subject: String,
    pub emp_id: String,
}

/// One alert per mismatch, addressed to the manager on the conflicting row.
pub fn mismatch_alerts(
    records: &[EmployeeRecord],
    mismatches: &[Mismatch],
) -> Vec<ManagerAlert> {
    mismatches
        .iter()
        .map(|m| ManagerAlert {
            kind: AlertKind::Mismatch,
            to: records
                .get(m.row)
                .map(|r| r.manager_email.clone())
                .unwrap_or_default(),
            subject: format!(
                "Mismatch detected for {}: {} vs {}",
                m.field, m.canonical_value, m.conflicting_value
            ),
            emp_id: m.emp_id.clone(),
        })
        .collect()
}

/// One alert per final record whose allocation is blank or unknown.
pub fn job_allocation_alerts(final_records: &[EmployeeRecord]) -> Vec<ManagerAlert> {
    final_records
        .iter()
        .filter(|r| is_allocation_missing(&r.job_allocation))
        .map(|r| ManagerAlert {
            kind: AlertKind::JobAllocation,
            to: r.manager_email.clone(),
            subject: format!("Job allocation missing for {} {}", r.emp_id, r.emp_name),
            emp_id: r.emp_id.clone(),
        })
        .collect()
}

pub fn leave_policy_alerts(violations: &[PolicyViolation]) -> Vec<ManagerAlert> {
    violations
        .iter()
        .map(|v| ManagerAlert {
            kind: AlertKind::LeavePolicy,
            to: v.manager_email.clone(),
            subject: format!(
                "Leave policy violation (>{LEAVE_STREAK_LIMIT} days): {} {} streak={}",
                v.emp_id, v.emp_name, v.leave_days_max_streak
            ),
            emp_id: v.emp_id.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{MismatchField, evaluate, tests::record};

    #[test]
    fn test_mismatch_alert_uses_conflicting_row_manager() {
        let first = record("E1", "Ann");
        let mut second = record("E1", "Ann");
        second.manager_email = "other@example.com".into();
        let mismatch = Mismatch {
            emp_id: "E1".into(),
            emp_name: "Ann".into(),
            field: MismatchField::Position,
            canonical_value: "Analyst".into(),
            conflicting_value: "Manager".into(),
            row: 1,
        };
        let alerts = mismatch_alerts(&[first, second], &[mismatch]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].to, "other@example.com");
        assert_eq!(alerts[0].kind, AlertKind::Mismatch);
        assert!(alerts[0].subject.contains("position"));
    }

    #[test]
    fn test_job_allocation_alerts_follow_record_identity() {
        let mut blank = record("E1", "Ann");
        blank.job_allocation = "".into();
        let mut allocated = record("E1", "Anne");
        allocated.job_allocation = "FIN".into();

        let (outcome, final_records) = evaluate(&[blank, allocated]);
        assert_eq!(final_records.len(), 2);

        let alerts = job_allocation_alerts(&final_records);
        assert_eq!(alerts.len(), outcome.job_allocation_issues.len());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::JobAllocation);
        assert_eq!(alerts[0].subject, "Job allocation missing for E1 Ann");
    }

    #[test]
    fn test_leave_policy_alert_subject() {
        let violation = PolicyViolation {
            emp_id: "E2".into(),
            emp_name: "Bob".into(),
            manager_email: "mgr@example.com".into(),
            leave_days_max_streak: 25,
            days_over_limit: 5,
        };
        let alerts = leave_policy_alerts(&[violation]);
        assert_eq!(
            alerts[0].subject,
            "Leave policy violation (>20 days): E2 Bob streak=25"
        );
    }
}
