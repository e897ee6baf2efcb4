//! Row and value sanitization steps used ahead of the consistency snapshot.

use super::consistency::unique_rows;
use crate::error::{PipelineError, Result};
use crate::utils::require_columns;
use polars::prelude::*;
use std::collections::HashSet;
use tracing::debug;

/// Trim surrounding whitespace from every column name.
///
/// Fails if two names collide after trimming.
pub(crate) fn trim_column_names(df: DataFrame) -> Result<DataFrame> {
    let mut df = df;
    let trimmed: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|name| name.trim().to_string())
        .collect();

    let mut seen = HashSet::with_capacity(trimmed.len());
    for name in &trimmed {
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::SchemaMismatch {
                column: name.clone(),
                reason: "column name is not unique after trimming".to_string(),
            });
        }
    }

    df.set_column_names(trimmed.iter().map(|s| s.as_str()))?;
    Ok(df)
}

/// Drop rows identical across all columns, keeping the first occurrence.
///
/// Row order of the kept rows is unchanged.
pub(crate) fn drop_duplicate_rows(df: DataFrame) -> Result<(DataFrame, usize)> {
    let before = df.height();
    let df = unique_rows(&df)?;
    let removed = before - df.height();
    if removed > 0 {
        debug!("Removed {} duplicate rows", removed);
    }
    Ok((df, removed))
}

/// Trim whitespace in the given string columns.
///
/// Columns that are not text typed are left alone.
pub(crate) fn trim_string_columns<S: AsRef<str>>(df: DataFrame, columns: &[S]) -> Result<DataFrame> {
    let mut df = df;
    require_columns(&df, columns, "string trimming")?;

    for name in columns {
        let name = name.as_ref();
        let series = df.column(name)?.as_materialized_series();
        if series.dtype() != &DataType::String {
            debug!("Skipping trim of non-text column '{}'", name);
            continue;
        }

        let trimmed: Vec<Option<String>> = series
            .str()?
            .into_iter()
            .map(|opt| opt.map(|s| s.trim().to_string()))
            .collect();
        let trimmed = Series::new(name.into(), trimmed);
        df.replace(name, trimmed)?;
    }

    Ok(df)
}

/// Drop rows that are null in any of the given columns.
pub(crate) fn drop_rows_missing<S: AsRef<str>>(
    df: DataFrame,
    columns: &[S],
) -> Result<(DataFrame, usize)> {
    if columns.is_empty() {
        return Ok((df, 0));
    }
    require_columns(&df, columns, "critical column check")?;

    let present = columns
        .iter()
        .map(|c| col(c.as_ref()).is_not_null())
        .reduce(|all, next| all.and(next))
        .unwrap_or_else(|| lit(true));

    let before = df.height();
    let df = df.lazy().filter(present).collect()?;
    let removed = before - df.height();
    if removed > 0 {
        debug!("Removed {} rows missing critical values", removed);
    }
    Ok((df, removed))
}
