//! Structural snapshots of a dataset.

use crate::error::Result;
use crate::types::{ColumnConsistency, ConsistencyReport};
use polars::prelude::*;

/// Produces [`ConsistencyReport`]s. Snapshots never modify the dataset.
pub struct ConsistencyChecker;

impl ConsistencyChecker {
    /// Take a structural snapshot of `df`.
    pub fn snapshot(df: &DataFrame) -> Result<ConsistencyReport> {
        let columns = df
            .get_columns()
            .iter()
            .map(|col| ColumnConsistency {
                name: col.name().to_string(),
                dtype: col.dtype().to_string(),
                null_count: col.null_count(),
            })
            .collect();

        Ok(ConsistencyReport {
            row_count: df.height(),
            column_count: df.width(),
            duplicate_row_count: duplicate_row_count(df)?,
            columns,
        })
    }
}

/// Number of rows identical (across all columns) to an earlier row.
pub fn duplicate_row_count(df: &DataFrame) -> Result<usize> {
    Ok(df.height() - unique_rows(df)?.height())
}

/// First occurrence of every distinct row, in input order. Nulls compare equal.
pub(crate) fn unique_rows(df: &DataFrame) -> Result<DataFrame> {
    if df.width() == 0 {
        return Ok(df.clone());
    }
    Ok(df
        .clone()
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?)
}
