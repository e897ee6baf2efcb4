//! Outlier filtering module.
//!
//! Two row-removal policies over a single numeric column:
//!
//! - [`OutlierPolicy::MeanMultipleThreshold`] keeps rows whose value is at most
//!   `multiple * mean`. Upper bound only. The mean is taken over whatever
//!   dataset is passed in, so applying the filter to its own output can remove
//!   more rows.
//! - [`OutlierPolicy::IqrBand`] keeps rows inside
//!   `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]`, inclusive at both ends.
//!
//! A cell that is null, NaN or not numeric takes no part in the mean or the
//! quartiles, fails the comparison, and its row is removed. A missing column is not an error: the dataset comes back
//! unchanged with a [`FilterOutcome::Skipped`] warning.

use crate::error::Result;
use crate::types::FilterOutcome;
use crate::utils::{f64_values, has_column};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// IQR multiplier for the band policy.
const IQR_FENCE: f64 = 1.5;

/// Selectable outlier policy for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OutlierPolicy {
    /// Keep rows with `value <= multiple * mean(column)`.
    MeanMultipleThreshold { column: String, multiple: f64 },
    /// Keep rows with `Q1 - 1.5*IQR <= value <= Q3 + 1.5*IQR`.
    IqrBand { column: String },
}

impl OutlierPolicy {
    pub fn mean_multiple(column: impl Into<String>, multiple: f64) -> Self {
        OutlierPolicy::MeanMultipleThreshold {
            column: column.into(),
            multiple,
        }
    }

    pub fn iqr_band(column: impl Into<String>) -> Self {
        OutlierPolicy::IqrBand {
            column: column.into(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            OutlierPolicy::MeanMultipleThreshold { column, .. } => column,
            OutlierPolicy::IqrBand { column } => column,
        }
    }

    /// Apply the policy, returning the filtered dataset and what happened.
    pub fn apply(&self, df: DataFrame) -> Result<(DataFrame, FilterOutcome)> {
        let column = self.column();

        if !has_column(&df, column) {
            let warning = format!(
                "Column '{}' not found in the dataset. No outliers removed.",
                column
            );
            warn!("{}", warning);
            return Ok((df, skipped(column, warning)));
        }

        let values = f64_values(df.column(column)?.as_materialized_series())?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();

        if present.is_empty() {
            let warning = format!(
                "Column '{}' has no numeric values. No outliers removed.",
                column
            );
            warn!("{}", warning);
            return Ok((df, skipped(column, warning)));
        }

        let (lower, upper) = match self {
            OutlierPolicy::MeanMultipleThreshold { multiple, .. } => {
                let mean = present.iter().sum::<f64>() / present.len() as f64;
                let threshold = multiple * mean;
                info!(
                    "Removing outliers in column '{}' greater than {}",
                    column, threshold
                );
                (None, threshold)
            }
            OutlierPolicy::IqrBand { .. } => {
                let (q1, q3) = quartiles(&present);
                let iqr = q3 - q1;
                let lower = q1 - IQR_FENCE * iqr;
                let upper = q3 + IQR_FENCE * iqr;
                info!(
                    "Removing outliers in column '{}' outside [{}, {}]",
                    column, lower, upper
                );
                (Some(lower), upper)
            }
        };

        let mask_values: Vec<bool> = values
            .iter()
            .map(|opt| match opt {
                Some(v) => lower.is_none_or(|lo| *v >= lo) && *v <= upper,
                None => false,
            })
            .collect();

        let before = df.height();
        let mask = BooleanChunked::from_slice("mask".into(), &mask_values);
        let filtered = df.filter(&mask)?;
        let rows_removed = before - filtered.height();
        debug!("Removed {} outlier rows from '{}'", rows_removed, column);

        Ok((
            filtered,
            FilterOutcome::Applied {
                column: column.to_string(),
                lower,
                upper,
                rows_removed,
            },
        ))
    }
}

fn skipped(column: &str, warning: String) -> FilterOutcome {
    FilterOutcome::Skipped {
        column: column.to_string(),
        warning,
    }
}

/// Q1 and Q3 with linear interpolation between closest ranks.
fn quartiles(values: &[f64]) -> (f64, f64) {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    (quantile_sorted(&sorted, 0.25), quantile_sorted(&sorted, 0.75))
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values_of(df: &DataFrame, column: &str) -> Vec<f64> {
        df.column(column)
            .unwrap()
            .cast(&DataType::Float64)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect()
    }

    // ==================== mean multiple tests ====================

    #[test]
    fn test_mean_multiple_basic() {
        // mean = 32.5, threshold = 48.75
        let df = df!["amount" => [10.0, 10.0, 10.0, 100.0]].unwrap();
        let (out, outcome) = OutlierPolicy::mean_multiple("amount", 1.5)
            .apply(df)
            .unwrap();

        assert_eq!(values_of(&out, "amount"), vec![10.0, 10.0, 10.0]);
        match outcome {
            FilterOutcome::Applied {
                lower,
                upper,
                rows_removed,
                ..
            } => {
                assert_eq!(lower, None);
                assert!((upper - 48.75).abs() < 1e-12);
                assert_eq!(rows_removed, 1);
            }
            other => panic!("expected Applied, got {:?}", other),
        }
    }

    #[test]
    fn test_mean_multiple_is_upper_bound_only() {
        // mean = 9.0, threshold = 13.5: the far-low 0.01 is kept
        let df = df!["amount" => [0.01, 10.99, 12.0, 13.0]].unwrap();
        let (out, _) = OutlierPolicy::mean_multiple("amount", 1.5)
            .apply(df)
            .unwrap();
        assert_eq!(out.height(), 4);
    }

    #[test]
    fn test_mean_multiple_not_idempotent() {
        // Pass 1: mean = 28.4, threshold = 42.6 -> drops 100
        // Pass 2: mean = 10.5, threshold = 15.75 -> drops 20
        let df = df!["amount" => [1.0, 1.0, 20.0, 20.0, 100.0]].unwrap();
        let policy = OutlierPolicy::mean_multiple("amount", 1.5);

        let (once, _) = policy.apply(df).unwrap();
        assert_eq!(once.height(), 4);

        let (twice, outcome) = policy.apply(once).unwrap();
        assert_eq!(values_of(&twice, "amount"), vec![1.0, 1.0]);
        assert_eq!(outcome.rows_removed(), 2);
    }

    #[test]
    fn test_mean_multiple_removes_null_rows() {
        let df = df!["amount" => [Some(10.0), None, Some(11.0)]].unwrap();
        let (out, _) = OutlierPolicy::mean_multiple("amount", 1.5)
            .apply(df)
            .unwrap();
        assert_eq!(out.height(), 2);
    }

    #[test]
    fn test_mean_multiple_ignores_nan() {
        // NaN stays out of the mean: threshold = 15.0, the NaN row is removed
        let df = df!["amount" => [10.0, 10.0, 10.0, f64::NAN]].unwrap();
        let (out, outcome) = OutlierPolicy::mean_multiple("amount", 1.5)
            .apply(df)
            .unwrap();

        assert_eq!(values_of(&out, "amount"), vec![10.0, 10.0, 10.0]);
        match outcome {
            FilterOutcome::Applied {
                upper, rows_removed, ..
            } => {
                assert!((upper - 15.0).abs() < 1e-12);
                assert_eq!(rows_removed, 1);
            }
            other => panic!("expected Applied, got {:?}", other),
        }
    }

    #[test]
    fn test_all_nan_column_is_skipped() {
        let df = df!["amount" => [f64::NAN, f64::NAN]].unwrap();
        let (out, outcome) = OutlierPolicy::mean_multiple("amount", 1.5)
            .apply(df)
            .unwrap();
        assert_eq!(out.height(), 2);
        assert!(outcome.is_skipped());
    }

    // ==================== IQR band tests ====================

    #[test]
    fn test_iqr_band_basic() {
        // Q1 = 2.25, Q3 = 4.75, IQR = 2.5, bounds = [-1.5, 8.5]
        let df = df!["price" => [1.0, 2.0, 3.0, 4.0, 5.0, 100.0]].unwrap();
        let (out, outcome) = OutlierPolicy::iqr_band("price").apply(df).unwrap();

        assert_eq!(values_of(&out, "price"), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        match outcome {
            FilterOutcome::Applied { lower, upper, .. } => {
                assert!((lower.unwrap() + 1.5).abs() < 1e-12);
                assert!((upper - 8.5).abs() < 1e-12);
            }
            other => panic!("expected Applied, got {:?}", other),
        }
    }

    #[test]
    fn test_iqr_band_idempotent() {
        let df = df!["price" => [1.0, 2.0, 3.0, 4.0, 5.0, 100.0]].unwrap();
        let policy = OutlierPolicy::iqr_band("price");
        let (once, _) = policy.apply(df).unwrap();
        let (twice, outcome) = policy.apply(once.clone()).unwrap();
        assert_eq!(once.height(), twice.height());
        assert_eq!(outcome.rows_removed(), 0);
    }

    #[test]
    fn test_iqr_band_bounds_are_inclusive() {
        // All equal: IQR = 0, bounds = [5, 5]
        let df = df!["v" => [5.0, 5.0, 5.0, 5.0]].unwrap();
        let (out, _) = OutlierPolicy::iqr_band("v").apply(df).unwrap();
        assert_eq!(out.height(), 4);
    }

    #[test]
    fn test_iqr_band_ignores_nan() {
        // Quartiles over the five finite values: bounds = [-1.0, 7.0]
        let df = df!["price" => [1.0, 2.0, f64::NAN, 3.0, 4.0, 5.0]].unwrap();
        let (out, outcome) = OutlierPolicy::iqr_band("price").apply(df).unwrap();

        assert_eq!(values_of(&out, "price"), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        match outcome {
            FilterOutcome::Applied { lower, upper, .. } => {
                assert!((lower.unwrap() + 1.0).abs() < 1e-12);
                assert!((upper - 7.0).abs() < 1e-12);
            }
            other => panic!("expected Applied, got {:?}", other),
        }
    }

    #[test]
    fn test_iqr_band_integer_column() {
        let df = df!["qty" => [1i64, 2, 3, 4, 5, 100]].unwrap();
        let (out, _) = OutlierPolicy::iqr_band("qty").apply(df).unwrap();
        assert_eq!(out.height(), 5);
        assert_eq!(out.column("qty").unwrap().dtype(), &DataType::Int64);
    }

    // ==================== shared behavior ====================

    #[test]
    fn test_missing_column_returns_unchanged() {
        let df = df!["other" => [1.0, 2.0, 300.0]].unwrap();
        let (out, outcome) = OutlierPolicy::iqr_band("UnitPrice").apply(df).unwrap();
        assert_eq!(out.height(), 3);
        assert!(outcome.is_skipped());
    }

    #[test]
    fn test_no_numeric_values_returns_unchanged() {
        let df = df!["amount" => ["a", "b"]].unwrap();
        let (out, outcome) = OutlierPolicy::mean_multiple("amount", 1.5)
            .apply(df)
            .unwrap();
        assert_eq!(out.height(), 2);
        assert!(outcome.is_skipped());
    }

    #[test]
    fn test_quantile_sorted_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0, 100.0];
        assert!((quantile_sorted(&sorted, 0.25) - 2.25).abs() < 1e-12);
        assert!((quantile_sorted(&sorted, 0.75) - 4.75).abs() < 1e-12);
        assert_eq!(quantile_sorted(&[7.0], 0.5), 7.0);
    }

    #[test]
    fn test_policy_deserialize() {
        let policy: OutlierPolicy =
            serde_json::from_str(r#"{"policy":"iqr_band","column":"UnitPrice"}"#).unwrap();
        assert_eq!(policy, OutlierPolicy::iqr_band("UnitPrice"));
    }
}
