//! Shared utilities for the scrubbing, warehouse and cube stages.
//!
//! This module contains helpers used across modules: dtype checks, column
//! lookups, and the lazy group-and-sort used by the cube and its reports.

use crate::error::{PipelineError, Result};
use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is an integer type.
#[inline]
pub fn is_integer_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    is_integer_dtype(dtype) || matches!(dtype, DataType::Float32 | DataType::Float64)
}

/// Check if a DataType is a date or datetime type.
#[inline]
pub fn is_temporal_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::Datetime(_, _) | DataType::Date)
}

// =============================================================================
// Column Utilities
// =============================================================================

/// Owned column names of a DataFrame, in schema order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect()
}

/// Check whether a DataFrame has a column with the given name.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Fail with [`PipelineError::SchemaMismatch`] on the first missing column.
pub fn require_columns<S: AsRef<str>>(df: &DataFrame, columns: &[S], context: &str) -> Result<()> {
    for column in columns {
        if !has_column(df, column.as_ref()) {
            return Err(PipelineError::missing_column(column.as_ref(), context));
        }
    }
    Ok(())
}

/// Read a column as `f64` values; NaN and non-numeric cells become `None`.
pub fn f64_values(series: &Series) -> Result<Vec<Option<f64>>> {
    let float_series = series.cast(&DataType::Float64)?;
    Ok(float_series
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

// =============================================================================
// Lazy Helpers
// =============================================================================

/// Column expressions for a list of names.
pub fn col_exprs<S: AsRef<str>>(columns: &[S]) -> Vec<Expr> {
    columns.iter().map(|c| col(c.as_ref())).collect()
}

/// Ascending sort over `columns`, nulls last, ties kept in input order.
pub fn sort_nulls_last<S: AsRef<str>>(lf: LazyFrame, columns: &[S]) -> LazyFrame {
    if columns.is_empty() {
        return lf;
    }
    lf.sort_by_exprs(
        col_exprs(columns),
        SortMultipleOptions::default()
            .with_nulls_last(true)
            .with_maintain_order(true),
    )
}

/// Group on `keys`, aggregate, and sort the groups by their keys.
pub fn group_sorted(
    df: &DataFrame,
    keys: &[Expr],
    key_names: &[String],
    aggs: Vec<Expr>,
) -> Result<DataFrame> {
    let grouped = df.clone().lazy().group_by_stable(keys.to_vec()).agg(aggs);
    Ok(sort_nulls_last(grouped, key_names).collect()?)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_integer_dtype(&DataType::Float32));
    }

    #[test]
    fn test_is_temporal_dtype() {
        assert!(is_temporal_dtype(&DataType::Date));
        assert!(is_temporal_dtype(&DataType::Datetime(
            TimeUnit::Milliseconds,
            None
        )));
        assert!(!is_temporal_dtype(&DataType::String));
    }

    #[test]
    fn test_require_columns() {
        let df = df!["a" => [1, 2], "b" => ["x", "y"]].unwrap();
        assert!(require_columns(&df, &["a", "b"], "test").is_ok());

        let err = require_columns(&df, &["a", "c"], "test").unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
        assert!(err.to_string().contains("'c'"));
    }

    #[test]
    fn test_f64_values_non_numeric_become_none() {
        let series = Series::new("v".into(), &["1.5", "abc", "3"]);
        let values = f64_values(&series).unwrap();
        assert_eq!(values, vec![Some(1.5), None, Some(3.0)]);
    }

    #[test]
    fn test_f64_values_nan_becomes_none() {
        let series = Series::new("v".into(), &[Some(1.0), Some(f64::NAN), None]);
        assert_eq!(f64_values(&series).unwrap(), vec![Some(1.0), None, None]);
    }

    #[test]
    fn test_group_sorted_nulls_last() {
        let df = df![
            "k" => [Some("b"), None, Some("a"), Some("b")],
            "v" => [1i64, 2, 3, 4],
        ]
        .unwrap();
        let out = group_sorted(
            &df,
            &[col("k")],
            &["k".to_string()],
            vec![col("v").sum().alias("total")],
        )
        .unwrap();

        let keys: Vec<Option<&str>> =
            out.column("k").unwrap().str().unwrap().into_iter().collect();
        assert_eq!(keys, vec![Some("a"), Some("b"), None]);
        let totals: Vec<Option<i64>> =
            out.column("total").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(totals, vec![Some(3), Some(5), Some(2)]);
    }
}
