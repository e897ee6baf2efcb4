use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value substituted for missing cells by the missing-value filler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FillValue {
    pub fn text(value: impl Into<String>) -> Self {
        FillValue::Text(value.into())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FillValue::Integer(_) | FillValue::Float(_))
    }
}

impl fmt::Display for FillValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillValue::Integer(v) => write!(f, "{}", v),
            FillValue::Float(v) => write!(f, "{}", v),
            FillValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Structure of one column at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConsistency {
    pub name: String,
    pub dtype: String,
    pub null_count: usize,
}

/// Structural snapshot of a dataset, captured before and after cleaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub row_count: usize,
    pub column_count: usize,
    pub duplicate_row_count: usize,
    pub columns: Vec<ColumnConsistency>,
}

impl ConsistencyReport {
    /// Null count of a column, if the column was present.
    pub fn null_count(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.null_count)
    }

    /// Declared type of a column, if the column was present.
    pub fn dtype(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.dtype.as_str())
    }

    /// Total nulls across all columns.
    pub fn total_nulls(&self) -> usize {
        self.columns.iter().map(|c| c.null_count).sum()
    }

    /// Rows lost between an earlier snapshot and this one.
    pub fn rows_removed_since(&self, before: &ConsistencyReport) -> usize {
        before.row_count.saturating_sub(self.row_count)
    }
}

/// What an outlier policy did to a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FilterOutcome {
    /// The policy ran; rows outside `[lower, upper]` were removed.
    Applied {
        column: String,
        lower: Option<f64>,
        upper: f64,
        rows_removed: usize,
    },
    /// The policy could not run and the dataset was returned unchanged.
    Skipped { column: String, warning: String },
}

impl FilterOutcome {
    pub fn rows_removed(&self) -> usize {
        match self {
            FilterOutcome::Applied { rows_removed, .. } => *rows_removed,
            FilterOutcome::Skipped { .. } => 0,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, FilterOutcome::Skipped { .. })
    }
}

/// Row counts per warehouse table after a load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub customer_rows: usize,
    pub product_rows: usize,
    pub sales_rows: usize,
    /// Tables dropped because they were not part of the fixed schema.
    pub dropped_tables: Vec<String>,
}

/// Outcome of scrubbing one entity.
#[derive(Debug, Clone)]
pub struct ScrubResult {
    /// The cleaned dataset.
    pub data: DataFrame,
    /// Snapshot taken after critical-column filtering, before filling.
    pub before: ConsistencyReport,
    /// Snapshot of the final dataset.
    pub after: ConsistencyReport,
    /// What the outlier policy did, if one was configured.
    pub outlier: Option<FilterOutcome>,
    /// Human-readable log of the cleaning actions taken.
    pub actions: Vec<String>,
}

impl ScrubResult {
    /// Rows removed between the two snapshots.
    pub fn rows_removed(&self) -> usize {
        self.after.rows_removed_since(&self.before)
    }
}
