//! Uniform substitution of missing cells.

use crate::error::Result;
use crate::types::FillValue;
use crate::utils::{is_integer_dtype, is_numeric_dtype};
use polars::prelude::*;
use tracing::debug;

/// Replaces every null cell with one caller-supplied default.
///
/// The filler is not column-type-aware: the same value goes into every
/// column. A column that cannot hold the value (text into a numeric or date
/// column) is converted to text first. Columns without nulls are untouched.
pub struct MissingValueFiller;

impl MissingValueFiller {
    pub fn fill(df: DataFrame, value: &FillValue) -> Result<DataFrame> {
        let mut df = df;
        let mut filled_cells = 0;

        let targets: Vec<(String, usize)> = df
            .get_columns()
            .iter()
            .filter(|col| col.null_count() > 0)
            .map(|col| (col.name().to_string(), col.null_count()))
            .collect();

        for (name, nulls) in targets {
            let series = df.column(&name)?.as_materialized_series().clone();
            let filled = fill_series(&series, value)?;
            df.replace(&name, filled)?;
            filled_cells += nulls;
            debug!("Filled {} missing values in '{}' with '{}'", nulls, name, value);
        }

        debug!("Filled {} missing cells in total", filled_cells);
        Ok(df)
    }
}

fn fill_series(series: &Series, value: &FillValue) -> Result<Series> {
    let dtype = series.dtype();
    let name = series.name().clone();

    let numeric_fill = match value {
        FillValue::Integer(v) => Some(*v as f64),
        FillValue::Float(v) => Some(*v),
        FillValue::Text(_) => None,
    };

    match (value, numeric_fill) {
        (FillValue::Integer(v), _) if is_integer_dtype(dtype) => {
            let source = series.cast(&DataType::Int64)?;
            let values: Vec<i64> = source
                .i64()?
                .into_iter()
                .map(|opt| opt.unwrap_or(*v))
                .collect();
            Ok(Series::new(name, values))
        }
        (_, Some(fill)) if is_numeric_dtype(dtype) => {
            let source = series.cast(&DataType::Float64)?;
            let values: Vec<f64> = source
                .f64()?
                .into_iter()
                .map(|opt| opt.unwrap_or(fill))
                .collect();
            Ok(Series::new(name, values))
        }
        _ => {
            let fill = value.to_string();
            let source = series.cast(&DataType::String)?;
            let values: Vec<String> = source
                .str()?
                .into_iter()
                .map(|opt| opt.map_or_else(|| fill.clone(), |s| s.to_string()))
                .collect();
            Ok(Series::new(name, values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_text_columns() {
        let df = df![
            "name" => [Some("a"), None, Some("c")],
            "region" => [Some("East"), Some("West"), None],
        ]
        .unwrap();

        let filled = MissingValueFiller::fill(df, &FillValue::text("N/A")).unwrap();
        let name = filled.column("name").unwrap().str().unwrap();
        assert_eq!(name.get(1), Some("N/A"));
        let region = filled.column("region").unwrap().str().unwrap();
        assert_eq!(region.get(2), Some("N/A"));
        assert_eq!(region.get(0), Some("East"));
    }

    #[test]
    fn test_text_default_converts_numeric_column() {
        let df = df![
            "age" => [Some(30i64), None],
            "score" => [1.5, 2.5],
        ]
        .unwrap();

        let filled = MissingValueFiller::fill(df, &FillValue::text("Unknown")).unwrap();
        let age = filled.column("age").unwrap();
        assert_eq!(age.dtype(), &DataType::String);
        assert_eq!(age.str().unwrap().get(0), Some("30"));
        assert_eq!(age.str().unwrap().get(1), Some("Unknown"));
        // No nulls: column keeps its numeric type
        assert_eq!(filled.column("score").unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn test_integer_default_keeps_integer_column() {
        let df = df!["qty" => [Some(3i64), None, Some(5)]].unwrap();
        let filled = MissingValueFiller::fill(df, &FillValue::Integer(0)).unwrap();
        let qty = filled.column("qty").unwrap();
        assert_eq!(qty.dtype(), &DataType::Int64);
        assert_eq!(qty.i64().unwrap().get(1), Some(0));
    }

    #[test]
    fn test_float_default_in_integer_column_becomes_float() {
        let df = df!["qty" => [Some(3i64), None]].unwrap();
        let filled = MissingValueFiller::fill(df, &FillValue::Float(0.5)).unwrap();
        let qty = filled.column("qty").unwrap();
        assert_eq!(qty.dtype(), &DataType::Float64);
        assert_eq!(qty.f64().unwrap().get(1), Some(0.5));
    }

    #[test]
    fn test_fill_leaves_no_nulls() {
        let df = df![
            "a" => [None::<i32>, Some(1)],
            "b" => [Some("x"), None],
        ]
        .unwrap();
        let filled = MissingValueFiller::fill(df, &FillValue::text("?")).unwrap();
        assert!(filled.get_columns().iter().all(|c| c.null_count() == 0));
        assert_eq!(filled.height(), 2);
    }
}
