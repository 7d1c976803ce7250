//! Employee dataset acquisition and normalization.
//!
//! A [`DatasetSource`] yields the raw table exactly as read; the normalizer
//! stage then turns raw rows into typed [`EmployeeRecord`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::error::DataLoadError;

/// Columns every dataset must carry. Extra columns are ignored.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    "emp_id",
    "emp_name",
    "position",
    "bonus",
    "paygrade",
    "manager_email",
    "job_allocation",
    "investigation_status",
    "leave_days_max_streak",
];

/// One raw row: column name to cell text.
pub type RawRow = BTreeMap<String, String>;

/// The table as loaded, rows in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Build a table from rows, validating that the required columns exist.
    pub fn new(columns: Vec<String>, rows: Vec<RawRow>) -> Result<Self, DataLoadError> {
        validate_columns(&columns)?;
        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of distinct non-blank `emp_id` values.
    pub fn unique_emp_ids(&self) -> usize {
        self.rows
            .iter()
            .filter_map(|row| row.get("emp_id"))
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Check a header row against [`REQUIRED_COLUMNS`].
pub fn validate_columns(columns: &[String]) -> Result<(), DataLoadError> {
    let present: HashSet<&str> = columns.iter().map(|c| c.trim()).collect();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !present.contains(**c))
        .map(|c| c.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DataLoadError::MissingColumns { columns: missing })
    }
}

/// Anything that can hand the pipeline an employee table.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Short human-readable description used in stage logs.
    fn describe(&self) -> String;

    async fn load(&self) -> Result<RawTable, DataLoadError>;
}

/// Reads the dataset from a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvDatasetSource {
    path: PathBuf,
}

impl CsvDatasetSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DatasetSource for CsvDatasetSource {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    async fn load(&self) -> Result<RawTable, DataLoadError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(DataLoadError::DatasetMissing {
                    path: self.path.clone(),
                });
            }
            Err(err) => {
                return Err(DataLoadError::Unreadable {
                    path: self.path.clone(),
                    message: err.to_string(),
                });
            }
        };
        parse_csv(&bytes).map_err(|err| match err {
            DataLoadError::Unreadable { message, .. } => DataLoadError::Unreadable {
                path: self.path.clone(),
                message,
            },
            other => other,
        })
    }
}

/// Parse CSV bytes into a raw table.
pub fn parse_csv(bytes: &[u8]) -> Result<RawTable, DataLoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()
        .map_err(|err| DataLoadError::Unreadable {
            path: PathBuf::new(),
            message: err.to_string(),
        })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    validate_columns(&columns)?;

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|err| DataLoadError::MalformedRow {
            row: idx + 1,
            message: err.to_string(),
        })?;
        let row: RawRow = columns
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(row);
    }

    Ok(RawTable { columns, rows })
}

/// A dataset held in memory, for tests and callers that build rows themselves.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    table: RawTable,
}

impl InMemorySource {
    pub fn new(table: RawTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl DatasetSource for InMemorySource {
    fn describe(&self) -> String {
        format!("memory:{} rows", self.table.len())
    }

    async fn load(&self) -> Result<RawTable, DataLoadError> {
        validate_columns(&self.table.columns)?;
        Ok(self.table.clone())
    }
}

/// A normalized employee row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub emp_id: String,
    pub emp_name: String,
    pub position: String,
    pub bonus: i64,
    pub paygrade: String,
    pub manager_email: String,
    pub job_allocation: String,
    pub investigation_status: String,
    pub leave_days_max_streak: i64,
}

/// Count of cells that could not be read as integers and were coerced to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionErrors {
    pub bonus: usize,
    pub leave_days_max_streak: usize,
}

impl ConversionErrors {
    pub fn total(&self) -> usize {
        self.bonus + self.leave_days_max_streak
    }
}

/// Turn raw rows into typed records, preserving row order.
///
/// Text fields are trimmed. Integer fields accept integral decimals such as
/// `1500.0`; anything else becomes 0 and is counted.
pub fn normalize(table: &RawTable) -> (Vec<EmployeeRecord>, ConversionErrors) {
    let mut errors = ConversionErrors::default();
    let records = table
        .rows
        .iter()
        .map(|row| {
            let text = |col: &str| row.get(col).map(|v| v.trim().to_string()).unwrap_or_default();
            let bonus = parse_integer(row.get("bonus")).unwrap_or_else(|| {
                errors.bonus += 1;
                0
            });
            let leave = parse_integer(row.get("leave_days_max_streak")).unwrap_or_else(|| {
                errors.leave_days_max_streak += 1;
                0
            });
            EmployeeRecord {
                emp_id: text("emp_id"),
                emp_name: text("emp_name"),
                position: text("position"),
                bonus,
                paygrade: text("paygrade"),
                manager_email: text("manager_email"),
                job_allocation: text("job_allocation"),
                investigation_status: text("investigation_status"),
                leave_days_max_streak: leave,
            }
        })
        .collect();
    (records, errors)
}

fn parse_integer(raw: Option<&String>) -> Option<i64> {
    let value = raw?.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    let f = value.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}
