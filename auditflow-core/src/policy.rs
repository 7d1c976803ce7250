//! Leave policy: no employee may take more than 20 consecutive days off.

use serde::{Deserialize, Serialize};

use crate::dataset::EmployeeRecord;

/// Longest allowed leave streak, in days. Streaks above this violate policy.
pub const LEAVE_STREAK_LIMIT: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub emp_id: String,
    pub emp_name: String,
    pub manager_email: String,
    pub leave_days_max_streak: i64,
    pub days_over_limit: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    pub checked: usize,
    pub compliant: usize,
    pub violations: Vec<PolicyViolation>,
}

impl PolicyOutcome {
    /// Share of checked records within the limit, as a percentage.
    pub fn compliance_rate(&self) -> f64 {
        if self.checked == 0 {
            100.0
        } else {
            self.compliant as f64 * 100.0 / self.checked as f64
        }
    }
}

pub fn violates_leave_policy(record: &EmployeeRecord) -> bool {
    record.leave_days_max_streak > LEAVE_STREAK_LIMIT
}

/// Check every record, keeping violations in record order.
pub fn check_leave_policy(records: &[EmployeeRecord]) -> PolicyOutcome {
    let violations: Vec<PolicyViolation> = records
        .iter()
        .filter(|r| violates_leave_policy(r))
        .map(|r| PolicyViolation {
            emp_id: r.emp_id.clone(),
            emp_name: r.emp_name.clone(),
            manager_email: r.manager_email.clone(),
            leave_days_max_streak: r.leave_days_max_streak,
            days_over_limit: r.leave_days_max_streak - LEAVE_STREAK_LIMIT,
        })
        .collect();

    PolicyOutcome {
        checked: records.len(),
        compliant: records.len() - violations.len(),
        violations,
    }
}
