//! Output column naming for cubes.

use super::CubeSpec;
use crate::error::{PipelineError, Result};
use std::collections::HashSet;

/// Separator between a metric column and its function.
pub const SEPARATOR: char = '_';

/// `<column>_<function>`, with any trailing separator trimmed.
///
/// An empty function suffix therefore yields the bare column name.
pub fn metric_column_name(column: &str, function: &str) -> String {
    format!("{}{}{}", column, SEPARATOR, function)
        .trim_end_matches(SEPARATOR)
        .to_string()
}

/// Every output column of a cube, in order: dimensions, one column per
/// metric function in declaration order, then the traceability column.
///
/// Fails with [`PipelineError::InvalidCubeSpec`] if two columns would share
/// a name.
pub fn output_columns(spec: &CubeSpec, trace_output: &str) -> Result<Vec<String>> {
    let mut names: Vec<String> = spec
        .dimensions
        .iter()
        .map(|d| d.trim_end_matches(SEPARATOR).to_string())
        .collect();

    for metric in &spec.metrics {
        for function in &metric.functions {
            names.push(metric_column_name(&metric.column, function.trim()));
        }
    }
    names.push(trace_output.trim_end_matches(SEPARATOR).to_string());

    let mut seen = HashSet::with_capacity(names.len());
    for name in &names {
        if !seen.insert(name.as_str()) {
            return Err(PipelineError::InvalidCubeSpec(format!(
                "output column '{}' would appear more than once",
                name
            )));
        }
    }

    Ok(names)
}
