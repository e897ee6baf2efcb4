//! Date standardization.
//!
//! Values are parsed into a polars `Date` column. A value that cannot be
//! parsed becomes null; parse failures are counted and logged but never
//! raised, so one bad cell cannot abort a stage.

use crate::error::{PipelineError, Result};
use crate::utils::has_column;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::debug;

/// Date-only formats tried after the caller's hint, in order.
const DATE_FORMATS: [&str; 10] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y%m%d",
];

/// Date-time formats, truncated to their date part.
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M",
];

/// Parses one column into canonical dates.
///
/// By default the column is replaced in place. With [`output_column`] the
/// parsed dates are added as a new column and the source is left as-is.
///
/// [`output_column`]: DateStandardizer::output_column
#[derive(Debug, Clone)]
pub struct DateStandardizer {
    column: String,
    format_hint: Option<String>,
    output_column: Option<String>,
}

impl DateStandardizer {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            format_hint: None,
            output_column: None,
        }
    }

    /// Try this `strftime` format before the built-in ones.
    pub fn format_hint(mut self, format: impl Into<String>) -> Self {
        self.format_hint = Some(format.into());
        self
    }

    /// Write the parsed dates to a new column instead of in place.
    pub fn output_column(mut self, name: impl Into<String>) -> Self {
        self.output_column = Some(name.into());
        self
    }

    /// Name of the column that holds the standardized dates.
    pub fn target_column(&self) -> &str {
        self.output_column.as_deref().unwrap_or(&self.column)
    }

    /// Standardize the configured column. Returns a new DataFrame.
    pub fn standardize(&self, df: &DataFrame) -> Result<DataFrame> {
        if !has_column(df, &self.column) {
            return Err(PipelineError::missing_column(
                &self.column,
                "date standardization",
            ));
        }

        let series = df.column(&self.column)?.as_materialized_series();
        let (parsed, failures) = self.parse_series(series)?;

        if failures > 0 {
            debug!(
                "{} values in '{}' could not be parsed as dates and were set to null",
                failures, self.column
            );
        }

        let mut out = df.clone();
        let parsed = parsed.with_name(self.target_column().into());
        if self.output_column.is_some() {
            out.with_column(parsed)?;
        } else {
            out.replace(&self.column, parsed)?;
        }
        Ok(out)
    }

    /// Returns the parsed `Date` series and the number of values that failed.
    fn parse_series(&self, series: &Series) -> Result<(Series, usize)> {
        match series.dtype() {
            DataType::Date => return Ok((series.clone(), 0)),
            DataType::Datetime(_, _) => return Ok((series.cast(&DataType::Date)?, 0)),
            _ => {}
        }

        let text = series.cast(&DataType::String)?;
        let mut failures = 0;
        let days: Vec<Option<i32>> = text
            .str()?
            .into_iter()
            .map(|opt| {
                let parsed = opt.and_then(|s| parse_date(s, self.format_hint.as_deref()));
                if opt.is_some() && parsed.is_none() {
                    failures += 1;
                }
                parsed.map(days_since_epoch)
            })
            .collect();

        let parsed = Series::new(series.name().clone(), days).cast(&DataType::Date)?;
        Ok((parsed, failures))
    }
}

/// Parse a single value, trying the hint first.
pub fn parse_date(value: &str, hint: Option<&str>) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(format) = hint
        && let Some(date) = parse_with_format(value, format)
    {
        return Some(date);
    }

    DATE_FORMATS
        .iter()
        .chain(DATETIME_FORMATS.iter())
        .find_map(|format| parse_with_format(value, format))
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

fn parse_with_format(value: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, format).ok().or_else(|| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|dt| dt.date())
    })
}

/// Days since 1970-01-01, the physical representation of a polars `Date`.
pub fn days_since_epoch(date: NaiveDate) -> i32 {
    (date - NaiveDate::default()).num_days() as i32
}

/// Inverse of [`days_since_epoch`].
pub fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::default().checked_add_signed(chrono::Duration::days(days as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_common_formats() {
        assert_eq!(parse_date("2024-01-15", None), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date("01/15/2024", None), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date("2024/01/15", None), Some(ymd(2024, 1, 15)));
        assert_eq!(parse_date("January 15, 2024", None), Some(ymd(2024, 1, 15)));
        assert_eq!(
            parse_date("2024-01-15 13:45:00", None),
            Some(ymd(2024, 1, 15))
        );
        assert_eq!(
            parse_date("2024-01-15T13:45:00+02:00", None),
            Some(ymd(2024, 1, 15))
        );
    }

    #[test]
    fn test_parse_date_hint_wins() {
        // Ambiguous day/month: the hint decides
        assert_eq!(parse_date("03/04/2024", None), Some(ymd(2024, 3, 4)));
        assert_eq!(
            parse_date("03/04/2024", Some("%d/%m/%Y")),
            Some(ymd(2024, 4, 3))
        );
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert_eq!(parse_date("not a date", None), None);
        assert_eq!(parse_date("", None), None);
        assert_eq!(parse_date("2024-13-40", None), None);
    }

    #[test]
    fn test_days_round_trip_epoch() {
        assert_eq!(days_since_epoch(ymd(1970, 1, 1)), 0);
        assert_eq!(days_since_epoch(ymd(1970, 1, 11)), 10);
        assert_eq!(date_from_days(10), Some(ymd(1970, 1, 11)));
    }

    #[test]
    fn test_unparsable_value_becomes_null() {
        let df = df![
            "SaleDate" => ["2024-01-15", "garbage", "2024-02-01"],
            "amount" => [1.0, 2.0, 3.0],
        ]
        .unwrap();

        let out = DateStandardizer::new("SaleDate").standardize(&df).unwrap();
        assert_eq!(out.height(), 3);

        let dates = out.column("SaleDate").unwrap();
        assert_eq!(dates.dtype(), &DataType::Date);
        assert_eq!(dates.null_count(), 1);
        assert_eq!(
            dates.get(0).unwrap(),
            AnyValue::Date(days_since_epoch(ymd(2024, 1, 15)))
        );
        assert_eq!(dates.get(1).unwrap(), AnyValue::Null);
        assert_eq!(
            dates.get(2).unwrap(),
            AnyValue::Date(days_since_epoch(ymd(2024, 2, 1)))
        );
    }

    #[test]
    fn test_output_column_keeps_source() {
        let df = df!["JoinDate" => ["2021-05-01", "bad"]].unwrap();
        let out = DateStandardizer::new("JoinDate")
            .output_column("StandardDateTime")
            .standardize(&df)
            .unwrap();

        assert_eq!(out.width(), 2);
        assert_eq!(out.column("JoinDate").unwrap().dtype(), &DataType::String);
        assert_eq!(
            out.column("StandardDateTime").unwrap().dtype(),
            &DataType::Date
        );
        assert_eq!(out.column("StandardDateTime").unwrap().null_count(), 1);
    }

    #[test]
    fn test_input_not_mutated() {
        let df = df!["d" => ["2024-01-01"]].unwrap();
        let _ = DateStandardizer::new("d").standardize(&df).unwrap();
        assert_eq!(df.column("d").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_missing_column_is_schema_mismatch() {
        let df = df!["other" => ["x"]].unwrap();
        let err = DateStandardizer::new("SaleDate")
            .standardize(&df)
            .unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
    }
}
