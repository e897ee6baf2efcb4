//! Fact-table enrichment ahead of cube building.

use crate::cleaner::{date_from_days, parse_date};
use crate::error::{PipelineError, Result};
use crate::utils::{has_column, is_integer_dtype, is_numeric_dtype, require_columns};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use tracing::debug;

/// Left-join `attributes` from `reference` onto `fact` by `key`.
///
/// Fact row order is preserved. Fact rows without a match (including null
/// keys) get null attributes and are kept. When a key repeats in the
/// reference, its first occurrence wins. Integer and integral float keys
/// match each other.
pub fn left_join_attribute<S: AsRef<str>>(
    fact: &DataFrame,
    reference: &DataFrame,
    key: &str,
    attributes: &[S],
) -> Result<DataFrame> {
    require_columns(fact, &[key], "attribute join (fact)")?;
    require_columns(reference, &[key], "attribute join (reference)")?;
    require_columns(reference, attributes, "attribute join (reference)")?;

    for attribute in attributes {
        if has_column(fact, attribute.as_ref()) {
            return Err(PipelineError::SchemaMismatch {
                column: attribute.as_ref().to_string(),
                reason: "already present in the fact dataset".to_string(),
            });
        }
    }

    let key_dtype = join_dtype(fact.column(key)?.dtype(), reference.column(key)?.dtype());

    let mut lookup_columns = vec![col(key).cast(key_dtype.clone()).alias(JOIN_KEY)];
    lookup_columns.extend(attributes.iter().map(|a| col(a.as_ref())));
    let firsts: Vec<Expr> = attributes.iter().map(|a| col(a.as_ref()).first()).collect();
    let lookup = reference
        .clone()
        .lazy()
        .select(lookup_columns)
        .filter(col(JOIN_KEY).is_not_null())
        .group_by_stable([col(JOIN_KEY)])
        .agg(firsts);

    let joined = fact
        .clone()
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .with_column(col(key).cast(key_dtype).alias(JOIN_KEY))
        .join(
            lookup,
            [col(JOIN_KEY)],
            [col(JOIN_KEY)],
            JoinArgs::new(JoinType::Left),
        )
        .sort_by_exprs([col(ROW_INDEX)], SortMultipleOptions::default())
        .collect()?;
    debug!("Joined attributes onto {} fact rows by '{}'", joined.height(), key);

    Ok(joined.drop(JOIN_KEY)?.drop(ROW_INDEX)?)
}

const JOIN_KEY: &str = "__join_key";
const ROW_INDEX: &str = "__fact_row";

/// Common key type: integers stay integers, mixed numerics compare as floats,
/// anything else as text.
fn join_dtype(fact: &DataType, reference: &DataType) -> DataType {
    if is_integer_dtype(fact) && is_integer_dtype(reference) {
        DataType::Int64
    } else if is_numeric_dtype(fact) && is_numeric_dtype(reference) {
        DataType::Float64
    } else {
        DataType::String
    }
}

/// Add `DayOfWeek` (English day name), `Month` (1-12) and `Year` derived
/// from a date column. Text dates are parsed; unparsable values yield nulls.
pub fn add_date_parts(fact: &DataFrame, date_column: &str) -> Result<DataFrame> {
    require_columns(fact, &[date_column], "date parts")?;

    let dates = read_dates(fact.column(date_column)?.as_materialized_series())?;

    let day_of_week: Vec<Option<String>> = dates
        .iter()
        .map(|d| d.map(|d| d.format("%A").to_string()))
        .collect();
    let month: Vec<Option<i32>> = dates.iter().map(|d| d.map(|d| d.month() as i32)).collect();
    let year: Vec<Option<i32>> = dates.iter().map(|d| d.map(|d| d.year())).collect();

    let mut out = fact.clone();
    out.with_column(Series::new("DayOfWeek".into(), day_of_week))?;
    out.with_column(Series::new("Month".into(), month))?;
    out.with_column(Series::new("Year".into(), year))?;
    Ok(out)
}

fn read_dates(series: &Series) -> Result<Vec<Option<NaiveDate>>> {
    if series.dtype() == &DataType::Date {
        let physical = series.to_physical_repr();
        return Ok(physical
            .i32()?
            .into_iter()
            .map(|opt| opt.and_then(date_from_days))
            .collect());
    }

    let text = series.cast(&DataType::String)?;
    Ok(text
        .str()?
        .into_iter()
        .map(|opt| opt.and_then(|s| parse_date(s, None)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::days_since_epoch;

    #[test]
    fn test_left_join_keeps_unmatched_rows() {
        let sales = df![
            "TransactionID" => [1i64, 2, 3, 4],
            "CustomerID" => [Some(10i64), Some(20), Some(99), None],
        ]
        .unwrap();
        let customers = df![
            "CustomerID" => [20i64, 10, 10],
            "Region" => ["West", "East", "North"],
        ]
        .unwrap();

        let out = left_join_attribute(&sales, &customers, "CustomerID", &["Region"]).unwrap();
        assert_eq!(out.height(), 4);
        let region: Vec<Option<&str>> = out
            .column("Region")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(region, vec![Some("East"), Some("West"), None, None]);

        let ids: Vec<i64> = out
            .column("TransactionID")
            .unwrap()
            .i64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_left_join_integer_matches_float_key() {
        let fact = df!["ProductID" => [1i64, 2]].unwrap();
        let reference = df![
            "ProductID" => [2.0, 1.0],
            "ProductName" => ["Gadget", "Widget"],
        ]
        .unwrap();
        let out = left_join_attribute(&fact, &reference, "ProductID", &["ProductName"]).unwrap();
        let names = out.column("ProductName").unwrap().str().unwrap();
        assert_eq!(names.get(0), Some("Widget"));
        assert_eq!(names.get(1), Some("Gadget"));
    }

    #[test]
    fn test_left_join_fractional_float_key_does_not_match() {
        let fact = df!["ProductID" => [1i64, 2]].unwrap();
        let reference = df![
            "ProductID" => [1.5, 2.0],
            "ProductName" => ["Half", "Gadget"],
        ]
        .unwrap();
        let out = left_join_attribute(&fact, &reference, "ProductID", &["ProductName"]).unwrap();
        let names = out.column("ProductName").unwrap().str().unwrap();
        assert_eq!(names.get(0), None);
        assert_eq!(names.get(1), Some("Gadget"));
        // Key column keeps its own type and no helper columns remain
        assert_eq!(out.column("ProductID").unwrap().dtype(), &DataType::Int64);
        assert_eq!(out.width(), 2);
    }

    #[test]
    fn test_left_join_missing_attribute() {
        let fact = df!["CustomerID" => [1i64]].unwrap();
        let reference = df!["CustomerID" => [1i64]].unwrap();
        let err = left_join_attribute(&fact, &reference, "CustomerID", &["Region"]).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
    }

    #[test]
    fn test_add_date_parts_from_text() {
        // 2024-01-15 is a Monday
        let fact = df!["SaleDate" => [Some("2024-01-15"), Some("bad"), None]].unwrap();
        let out = add_date_parts(&fact, "SaleDate").unwrap();

        let day = out.column("DayOfWeek").unwrap().str().unwrap();
        assert_eq!(day.get(0), Some("Monday"));
        assert_eq!(day.get(1), None);
        assert_eq!(out.column("Month").unwrap().i32().unwrap().get(0), Some(1));
        assert_eq!(out.column("Year").unwrap().i32().unwrap().get(0), Some(2024));
        assert_eq!(out.column("Year").unwrap().i32().unwrap().get(2), None);
    }

    #[test]
    fn test_add_date_parts_from_date_column() {
        let days = days_since_epoch(NaiveDate::from_ymd_opt(2023, 10, 7).unwrap());
        let fact = DataFrame::new(vec![
            Series::new("SaleDate".into(), [days])
                .cast(&DataType::Date)
                .unwrap()
                .into(),
        ])
        .unwrap();

        let out = add_date_parts(&fact, "SaleDate").unwrap();
        assert_eq!(
            out.column("DayOfWeek").unwrap().str().unwrap().get(0),
            Some("Saturday")
        );
        assert_eq!(out.column("Month").unwrap().i32().unwrap().get(0), Some(10));
    }
}
