//! Data-quality rules over the normalized employee table.
//!
//! Every function here is pure and deterministic: the same records in the same
//! order always produce the same findings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::dataset::EmployeeRecord;

/// `job_allocation` value treated the same as a blank allocation.
pub const UNKNOWN_ALLOCATION: &str = "unknown";

/// Records sharing one `(emp_id, emp_name)` identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub emp_id: String,
    pub emp_name: String,
    /// Row indices in original order; the first one is canonical.
    pub rows: Vec<usize>,
}

impl DuplicateGroup {
    pub fn canonical(&self) -> usize {
        self.rows[0]
    }

    /// Rows dropped from the final record set.
    pub fn duplicates(&self) -> &[usize] {
        &self.rows[1..]
    }
}

/// Result of deduplicating the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deduplication {
    /// Only groups with two or more members.
    pub groups: Vec<DuplicateGroup>,
    /// Indices of the records that survive, in original order.
    pub kept: Vec<usize>,
}

/// Fields compared between duplicate-group members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchField {
    Position,
    Bonus,
    Paygrade,
}

impl MismatchField {
    pub const ALL: [MismatchField; 3] = [
        MismatchField::Position,
        MismatchField::Bonus,
        MismatchField::Paygrade,
    ];

    fn value_of(self, record: &EmployeeRecord) -> String {
        match self {
            MismatchField::Position => record.position.clone(),
            MismatchField::Bonus => record.bonus.to_string(),
            MismatchField::Paygrade => record.paygrade.clone(),
        }
    }
}

impl fmt::Display for MismatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MismatchField::Position => write!(f, "position"),
            MismatchField::Bonus => write!(f, "bonus"),
            MismatchField::Paygrade => write!(f, "paygrade"),
        }
    }
}

/// A non-canonical duplicate whose field value differs from the canonical row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub emp_id: String,
    pub emp_name: String,
    pub field: MismatchField,
    pub canonical_value: String,
    pub conflicting_value: String,
    /// Row index of the conflicting record.
    pub row: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchCounts {
    pub position: usize,
    pub bonus: usize,
    pub paygrade: usize,
}

impl MismatchCounts {
    pub fn from_mismatches(mismatches: &[Mismatch]) -> Self {
        let mut counts = Self::default();
        for m in mismatches {
            match m.field {
                MismatchField::Position => counts.position += 1,
                MismatchField::Bonus => counts.bonus += 1,
                MismatchField::Paygrade => counts.paygrade += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.position + self.bonus + self.paygrade
    }
}

/// Investigation statuses the rollup recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    PastCleared,
    PastFlagged,
    Ongoing,
}

impl InvestigationStatus {
    /// Case-insensitive match against the known values.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "past_cleared" => Some(InvestigationStatus::PastCleared),
            "past_flagged" => Some(InvestigationStatus::PastFlagged),
            "ongoing" => Some(InvestigationStatus::Ongoing),
            _ => None,
        }
    }
}

/// Final records counted by investigation status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationRollup {
    pub past_cleared: usize,
    pub past_flagged: usize,
    pub ongoing: usize,
    /// Blank status.
    pub missing: usize,
    /// Non-blank values outside the known set, by their trimmed text.
    pub unrecognized: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unrecognized_values: Vec<String>,
}

impl InvestigationRollup {
    pub fn total(&self) -> usize {
        self.past_cleared + self.past_flagged + self.ongoing + self.missing + self.unrecognized
    }
}

/// Everything the rules stage produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulesOutcome {
    pub normalized_row_count: usize,
    pub final_row_count: usize,
    pub duplicates_removed: usize,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub mismatches: Vec<Mismatch>,
    pub mismatch_counts: MismatchCounts,
    /// `emp_id`s of final records with a blank or unknown allocation.
    pub job_allocation_issues: Vec<String>,
    pub investigation_rollup: InvestigationRollup,
}

/// Group records by `(emp_id, emp_name)`; the first row of each group wins.
pub fn deduplicate(records: &[EmployeeRecord]) -> Deduplication {
    let mut by_key: HashMap<(&str, &str), usize> = HashMap::new();
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    let mut kept = Vec::new();

    for (idx, record) in records.iter().enumerate() {
        let key = (record.emp_id.as_str(), record.emp_name.as_str());
        match by_key.get(&key) {
            Some(&group) => groups[group].rows.push(idx),
            None => {
                by_key.insert(key, groups.len());
                groups.push(DuplicateGroup {
                    emp_id: record.emp_id.clone(),
                    emp_name: record.emp_name.clone(),
                    rows: vec![idx],
                });
                kept.push(idx);
            }
        }
    }

    groups.retain(|g| g.rows.len() > 1);
    Deduplication { groups, kept }
}

/// Compare each non-canonical member of every group to its canonical row.
pub fn detect_mismatches(records: &[EmployeeRecord], groups: &[DuplicateGroup]) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    for group in groups {
        let canonical = &records[group.canonical()];
        for &row in group.duplicates() {
            let member = &records[row];
            for field in MismatchField::ALL {
                let expected = field.value_of(canonical);
                let actual = field.value_of(member);
                if expected != actual {
                    mismatches.push(Mismatch {
                        emp_id: group.emp_id.clone(),
                        emp_name: group.emp_name.clone(),
                        field,
                        canonical_value: expected,
                        conflicting_value: actual,
                        row,
                    });
                }
            }
        }
    }
    mismatches
}

/// Whether an allocation value counts as missing.
pub fn is_allocation_missing(allocation: &str) -> bool {
    let value = allocation.trim();
    value.is_empty() || value.eq_ignore_ascii_case(UNKNOWN_ALLOCATION)
}

pub fn job_allocation_issues<'a, I>(records: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a EmployeeRecord>,
{
    records
        .into_iter()
        .filter(|r| is_allocation_missing(&r.job_allocation))
        .map(|r| r.emp_id.clone())
        .collect()
}

pub fn investigation_rollup<'a, I>(records: I) -> InvestigationRollup
where
    I: IntoIterator<Item = &'a EmployeeRecord>,
{
    let mut rollup = InvestigationRollup::default();
    for record in records {
        let raw = record.investigation_status.trim();
        match InvestigationStatus::parse(raw) {
            Some(InvestigationStatus::PastCleared) => rollup.past_cleared += 1,
            Some(InvestigationStatus::PastFlagged) => rollup.past_flagged += 1,
            Some(InvestigationStatus::Ongoing) => rollup.ongoing += 1,
            None if raw.is_empty() => rollup.missing += 1,
            None => {
                rollup.unrecognized += 1;
                if !rollup.unrecognized_values.iter().any(|v| v == raw) {
                    rollup.unrecognized_values.push(raw.to_string());
                }
            }
        }
    }
    rollup
}

/// Run every rule and return the findings plus the final (deduplicated) records.
pub fn evaluate(records: &[EmployeeRecord]) -> (RulesOutcome, Vec<EmployeeRecord>) {
    let dedup = deduplicate(records);
    let final_records: Vec<EmployeeRecord> =
        dedup.kept.iter().map(|&i| records[i].clone()).collect();
    let mismatches = detect_mismatches(records, &dedup.groups);

    let outcome = RulesOutcome {
        normalized_row_count: records.len(),
        final_row_count: final_records.len(),
        duplicates_removed: records.len() - final_records.len(),
        mismatch_counts: MismatchCounts::from_mismatches(&mismatches),
        duplicate_groups: dedup.groups,
        mismatches,
        job_allocation_issues: job_allocation_issues(&final_records),
        investigation_rollup: investigation_rollup(&final_records),
    };
    (outcome, final_records)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(emp_id: &str, emp_name: &str) -> EmployeeRecord {
        EmployeeRecord {
            emp_id: emp_id.to_string(),
            emp_name: emp_name.to_string(),
            position: "Analyst".to_string(),
            bonus: 1000,
            paygrade: "P2".to_string(),
            manager_email: "mgr@example.com".to_string(),
            job_allocation: "FIN".to_string(),
            investigation_status: "past_cleared".to_string(),
            leave_days_max_streak: 5,
        }
    }

    #[test]
    fn test_deduplicate_first_row_canonical() {
        let records = vec![
            record("E1", "Ann"),
            record("E2", "Ben"),
            record("E1", "Ann"),
            record("E1", "Ann"),
        ];
        let dedup = deduplicate(&records);
        assert_eq!(dedup.kept, vec![0, 1]);
        assert_eq!(dedup.groups.len(), 1);
        assert_eq!(dedup.groups[0].rows, vec![0, 2, 3]);
        assert_eq!(dedup.groups[0].canonical(), 0);
        assert_eq!(dedup.groups[0].duplicates(), &[2, 3]);
    }

    #[test]
    fn test_same_id_different_name_is_not_duplicate() {
        let records = vec![record("E1", "Ann"), record("E1", "Anne")];
        let dedup = deduplicate(&records);
        assert!(dedup.groups.is_empty());
        assert_eq!(dedup.kept, vec![0, 1]);
    }

    #[test]
    fn test_mismatch_one_entry_per_member_per_field() {
        let mut a = record("E1", "Ann");
        a.position = "Analyst".into();
        let mut b = record("E1", "Ann");
        b.position = "Manager".into();
        let mut c = record("E1", "Ann");
        c.position = "Director".into();
        c.bonus = 2000;

        let records = vec![a, b, c];
        let dedup = deduplicate(&records);
        let mismatches = detect_mismatches(&records, &dedup.groups);
        let counts = MismatchCounts::from_mismatches(&mismatches);
        assert_eq!(counts.position, 2);
        assert_eq!(counts.bonus, 1);
        assert_eq!(counts.paygrade, 0);

        let bonus = mismatches
            .iter()
            .find(|m| m.field == MismatchField::Bonus)
            .unwrap();
        assert_eq!(bonus.canonical_value, "1000");
        assert_eq!(bonus.conflicting_value, "2000");
        assert_eq!(bonus.row, 2);
    }

    #[test]
    fn test_mismatch_compares_against_canonical_not_neighbour() {
        let mut a = record("E1", "Ann");
        a.paygrade = "P2".into();
        let mut b = record("E1", "Ann");
        b.paygrade = "P3".into();
        let mut c = record("E1", "Ann");
        c.paygrade = "P3".into();

        let records = vec![a, b, c];
        let dedup = deduplicate(&records);
        let mismatches = detect_mismatches(&records, &dedup.groups);
        assert_eq!(mismatches.len(), 2);
        assert!(mismatches.iter().all(|m| m.canonical_value == "P2"));
    }

    #[test]
    fn test_job_allocation_blank_and_unknown() {
        let mut blank = record("E1", "Ann");
        blank.job_allocation = "  ".into();
        let mut unknown = record("E2", "Ben");
        unknown.job_allocation = "UnKnown".into();
        let fine = record("E3", "Cat");
        let issues = job_allocation_issues(&[blank, unknown, fine]);
        assert_eq!(issues, vec!["E1".to_string(), "E2".to_string()]);
    }

    #[test]
    fn test_investigation_rollup_keeps_unknowns_separate() {
        let statuses = ["past_cleared", "PAST_FLAGGED", "ongoing", "", "closed", "closed"];
        let records: Vec<_> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mut r = record(&format!("E{i}"), "X");
                r.investigation_status = s.to_string();
                r
            })
            .collect();
        let rollup = investigation_rollup(&records);
        assert_eq!(rollup.past_cleared, 1);
        assert_eq!(rollup.past_flagged, 1);
        assert_eq!(rollup.ongoing, 1);
        assert_eq!(rollup.missing, 1);
        assert_eq!(rollup.unrecognized, 2);
        assert_eq!(rollup.unrecognized_values, vec!["closed".to_string()]);
        assert_eq!(rollup.total(), records.len());
    }

    #[test]
    fn test_evaluate_counts_add_up() {
        let mut dup = record("E1", "Ann");
        dup.job_allocation = String::new();
        let records = vec![record("E1", "Ann"), record("E2", "Ben"), dup];
        let (outcome, final_records) = evaluate(&records);
        assert_eq!(outcome.normalized_row_count, 3);
        assert_eq!(outcome.final_row_count, 2);
        assert_eq!(outcome.duplicates_removed, 1);
        assert_eq!(final_records.len(), 2);
        // The blank allocation sits on the dropped duplicate.
        assert!(outcome.job_allocation_issues.is_empty());
        assert_eq!(outcome.investigation_rollup.total(), 2);
    }

    #[test]
    fn test_evaluate_empty_table() {
        let (outcome, final_records) = evaluate(&[]);
        assert_eq!(outcome.duplicates_removed, 0);
        assert!(final_records.is_empty());
        assert!(outcome.mismatches.is_empty());
    }
}
