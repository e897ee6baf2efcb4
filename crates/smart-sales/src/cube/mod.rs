//! Multidimensional cube construction.
//!
//! A cube groups a fact dataset by a tuple of dimension columns and computes
//! the requested aggregates per group. Every cube row additionally carries
//! the ordered list of source identifiers that contributed to it.
//!
//! Rows are sorted ascending by dimension tuple: numbers numerically,
//! strings by byte order, dates chronologically, nulls after every value.

pub mod enrich;
pub mod naming;

use crate::error::{PipelineError, Result};
use crate::io::write_csv;
use crate::utils::{group_sorted, is_integer_dtype, is_numeric_dtype, require_columns};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Default source identifier collected per cube row.
pub const TRACE_SOURCE_COLUMN: &str = "TransactionID";

/// Default name of the traceability column.
pub const TRACE_OUTPUT_COLUMN: &str = "TransactionIDs";

/// Aggregation functions available to cube metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    Sum,
    Mean,
    Count,
    Min,
    Max,
    Median,
    NUnique,
}

impl AggFunc {
    pub const ALL: [AggFunc; 7] = [
        AggFunc::Sum,
        AggFunc::Mean,
        AggFunc::Count,
        AggFunc::Min,
        AggFunc::Max,
        AggFunc::Median,
        AggFunc::NUnique,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Count => "count",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Median => "median",
            AggFunc::NUnique => "nunique",
        }
    }

    /// Look up a function by name, ignoring case and surrounding whitespace.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    /// Whether the function needs a numeric column.
    pub fn requires_numeric(&self) -> bool {
        !matches!(self, AggFunc::Count | AggFunc::NUnique)
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One metric column and the ordered functions applied to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub column: String,
    pub functions: Vec<String>,
}

impl MetricSpec {
    pub fn new<I, S>(column: impl Into<String>, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            column: column.into(),
            functions: functions.into_iter().map(Into::into).collect(),
        }
    }
}

/// Dimensions and metrics of a cube.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CubeSpec {
    pub dimensions: Vec<String>,
    pub metrics: Vec<MetricSpec>,
}

impl CubeSpec {
    pub fn new<I, S>(dimensions: I, metrics: Vec<MetricSpec>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            metrics,
        }
    }

    /// Check the cube's shape without looking at any data.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions.is_empty() {
            return Err(PipelineError::InvalidCubeSpec(
                "at least one dimension is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.dimensions.len());
        for dimension in &self.dimensions {
            if !seen.insert(dimension.as_str()) {
                return Err(PipelineError::InvalidCubeSpec(format!(
                    "dimension '{}' is listed more than once",
                    dimension
                )));
            }
        }

        for metric in &self.metrics {
            if metric.functions.is_empty() {
                return Err(PipelineError::InvalidCubeSpec(format!(
                    "metric '{}' has no aggregation functions",
                    metric.column
                )));
            }
            if let Some(unknown) = metric
                .functions
                .iter()
                .find(|f| AggFunc::parse(f).is_none())
            {
                return Err(PipelineError::InvalidCubeSpec(format!(
                    "unknown aggregation function '{}' for metric '{}'",
                    unknown, metric.column
                )));
            }
        }

        Ok(())
    }

    /// Metric columns paired with their parsed functions.
    fn resolved_metrics(&self) -> Vec<(&str, Vec<AggFunc>)> {
        self.metrics
            .iter()
            .map(|m| {
                (
                    m.column.as_str(),
                    m.functions.iter().filter_map(|f| AggFunc::parse(f)).collect(),
                )
            })
            .collect()
    }
}

/// A built cube.
#[derive(Debug, Clone)]
pub struct Cube {
    data: DataFrame,
    dimensions: Vec<String>,
    trace_column: String,
}

impl Cube {
    /// The cube frame, traceability column included as a list column.
    pub fn data(&self) -> &DataFrame {
        &self.data
    }

    pub fn into_data(self) -> DataFrame {
        self.data
    }

    /// Output names of the dimension columns.
    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn trace_column(&self) -> &str {
        &self.trace_column
    }

    pub fn height(&self) -> usize {
        self.data.height()
    }

    /// Source identifiers that contributed to one cube row.
    pub fn trace_ids(&self, row: usize) -> Result<Option<Series>> {
        let lists = self
            .data
            .column(&self.trace_column)?
            .as_materialized_series()
            .list()?;
        Ok(lists.get_as_series(row))
    }

    /// The cube with its list column rendered as text (`[1, 2]`), ready
    /// for flat-file output.
    pub fn to_flat(&self) -> Result<DataFrame> {
        let lists = self
            .data
            .column(&self.trace_column)?
            .as_materialized_series()
            .list()?;
        let rendered: Vec<Option<String>> = lists
            .into_iter()
            .map(|opt| opt.map(|ids| render_list(&ids)).transpose())
            .collect::<Result<_>>()?;

        let mut flat = self.data.clone();
        flat.replace(
            &self.trace_column,
            Series::new(self.trace_column.as_str().into(), rendered),
        )?;
        Ok(flat)
    }

    /// Write the flattened cube as CSV.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut flat = self.to_flat()?;
        write_csv(&mut flat, path.as_ref())?;
        info!(
            "Cube saved to {} ({} rows)",
            path.as_ref().display(),
            flat.height()
        );
        Ok(())
    }
}

fn render_list(ids: &Series) -> Result<String> {
    let mut parts = Vec::with_capacity(ids.len());
    for i in 0..ids.len() {
        parts.push(match ids.get(i)? {
            AnyValue::Null => "null".to_string(),
            AnyValue::String(s) => s.to_string(),
            AnyValue::StringOwned(s) => s.to_string(),
            other => other.to_string(),
        });
    }
    Ok(format!("[{}]", parts.join(", ")))
}

/// Builds [`Cube`]s from a fact dataset.
///
/// # Example
///
/// ```rust,ignore
/// use smart_sales::cube::{CubeBuilder, CubeSpec, MetricSpec};
///
/// let spec = CubeSpec::new(["Day"], vec![MetricSpec::new("Amount", ["sum", "mean"])]);
/// let cube = CubeBuilder::new().trace_column("id").build(&facts, &spec)?;
/// ```
#[derive(Debug, Clone)]
pub struct CubeBuilder {
    trace_column: String,
    trace_output_column: String,
}

static_assertions::assert_impl_all!(CubeBuilder: Send, Sync);
static_assertions::assert_impl_all!(Cube: Send);

impl Default for CubeBuilder {
    fn default() -> Self {
        Self {
            trace_column: TRACE_SOURCE_COLUMN.to_string(),
            trace_output_column: TRACE_OUTPUT_COLUMN.to_string(),
        }
    }
}

impl CubeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source identifier collected into the traceability column.
    pub fn trace_column(mut self, column: impl Into<String>) -> Self {
        self.trace_column = column.into();
        self
    }

    /// Name of the traceability column.
    pub fn trace_output_column(mut self, name: impl Into<String>) -> Self {
        self.trace_output_column = name.into();
        self
    }

    /// Group `fact` by the cube dimensions and aggregate its metrics.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidCubeSpec`] for a malformed spec and
    /// [`PipelineError::SchemaMismatch`] for a missing or non-numeric
    /// column. Nothing is grouped until validation passes.
    pub fn build(&self, fact: &DataFrame, spec: &CubeSpec) -> Result<Cube> {
        spec.validate()?;
        let names = naming::output_columns(spec, &self.trace_output_column)?;
        let metrics = spec.resolved_metrics();
        self.validate_columns(fact, spec, &metrics)?;

        info!(
            "Building cube over {} rows with dimensions {:?}",
            fact.height(),
            spec.dimensions
        );

        let mut names = names.into_iter();
        let mut keys = Vec::with_capacity(spec.dimensions.len());
        let mut dimensions = Vec::with_capacity(spec.dimensions.len());
        for dimension in &spec.dimensions {
            let name = next_name(&mut names)?;
            keys.push(col(dimension.as_str()).alias(name.as_str()));
            dimensions.push(name);
        }

        let mut aggs = Vec::new();
        for (column, functions) in &metrics {
            let dtype = fact.column(column)?.dtype();
            for function in functions {
                let name = next_name(&mut names)?;
                aggs.push(metric_expr(column, dtype, *function).alias(name.as_str()));
            }
        }

        let trace_name = next_name(&mut names)?;
        aggs.push(col(self.trace_column.as_str()).alias(trace_name.as_str()));

        let data = group_sorted(fact, &keys, &dimensions, aggs)?;
        debug!("Found {} distinct dimension tuples", data.height());
        info!("Cube built with {} rows and {} columns", data.height(), data.width());

        Ok(Cube {
            data,
            dimensions,
            trace_column: trace_name,
        })
    }

    fn validate_columns(
        &self,
        fact: &DataFrame,
        spec: &CubeSpec,
        metrics: &[(&str, Vec<AggFunc>)],
    ) -> Result<()> {
        require_columns(fact, &spec.dimensions, "cube dimensions")?;
        let metric_columns: Vec<&str> = metrics.iter().map(|(c, _)| *c).collect();
        require_columns(fact, &metric_columns, "cube metrics")?;
        require_columns(fact, &[self.trace_column.as_str()], "cube traceability")?;

        for (column, functions) in metrics {
            let dtype = fact.column(column)?.dtype();
            if let Some(function) = functions.iter().find(|f| f.requires_numeric())
                && !is_numeric_dtype(dtype)
            {
                return Err(PipelineError::SchemaMismatch {
                    column: column.to_string(),
                    reason: format!("'{}' needs a numeric column, found {}", function, dtype),
                });
            }
        }
        Ok(())
    }
}

fn next_name(names: &mut impl Iterator<Item = String>) -> Result<String> {
    names
        .next()
        .ok_or_else(|| PipelineError::InvalidCubeSpec("output column count mismatch".to_string()))
}

/// Aggregate expression for one metric function.
///
/// Integer inputs are widened to `Int64` and float inputs to `Float64`, with
/// NaN treated as missing. Count and nunique skip nulls.
pub(crate) fn metric_expr(column: &str, dtype: &DataType, function: AggFunc) -> Expr {
    let value = if is_integer_dtype(dtype) {
        col(column).cast(DataType::Int64)
    } else if is_numeric_dtype(dtype) {
        col(column).cast(DataType::Float64).fill_nan(lit(NULL))
    } else {
        col(column)
    };

    match function {
        AggFunc::Sum => value.sum(),
        AggFunc::Mean => value.mean(),
        AggFunc::Min => value.min(),
        AggFunc::Max => value.max(),
        AggFunc::Median => value.median(),
        AggFunc::Count => value.count().cast(DataType::Int64),
        AggFunc::NUnique => value.drop_nulls().n_unique().cast(DataType::Int64),
    }
}
