//! Configuration types for the scrubbing, warehouse and cube stages.
//!
//! Every path and per-entity rule lives in an explicit configuration object
//! handed to each stage at construction. Configurations use the builder
//! pattern and are serde types, so a JSON file can override any part.

use crate::cleaner::OutlierPolicy;
use crate::cube::{CubeSpec, MetricSpec, TRACE_SOURCE_COLUMN};
use crate::error::{PipelineError, Result};
use crate::types::FillValue;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How an entity's date column is standardized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateColumnConfig {
    /// Column holding the raw date values.
    pub column: String,

    /// `strftime` format tried before the built-in formats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_hint: Option<String>,

    /// Write parsed dates to this new column instead of in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_column: Option<String>,

    /// Drop rows whose date could not be parsed.
    #[serde(default)]
    pub required: bool,
}

impl DateColumnConfig {
    pub fn in_place(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            format_hint: None,
            output_column: None,
            required: false,
        }
    }
}

/// Per-entity scrubbing rules.
///
/// One of these drives the scrubbing pipeline for customers, products or
/// sales. Use the presets ([`EntityConfig::customers`] and friends) or
/// [`EntityConfig::builder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Entity label used in logs ("customers", "products", "sales").
    pub name: String,

    /// Raw input file name, relative to the raw directory.
    pub raw_file: String,

    /// Cleaned output file name, relative to the prepared directory.
    pub prepared_file: String,

    /// Rows null in any of these columns are dropped.
    #[serde(default)]
    pub critical_columns: Vec<String>,

    /// Text columns whose values are whitespace-trimmed.
    #[serde(default)]
    pub trim_columns: Vec<String>,

    /// Default substituted for remaining missing cells. `None` skips filling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_value: Option<FillValue>,

    /// Date column to standardize, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateColumnConfig>,

    /// The single outlier policy to apply, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outlier: Option<OutlierPolicy>,
}

impl EntityConfig {
    /// Create a new entity configuration builder.
    pub fn builder(name: impl Into<String>) -> EntityConfigBuilder {
        EntityConfigBuilder::new(name)
    }

    /// Customers: keyed by id and name, "N/A" fill, `JoinDate` parsed into a
    /// derived `StandardDateTime` column.
    pub fn customers() -> Self {
        EntityConfig::builder("customers")
            .files("customers_data.csv", "customers_data_prepared.csv")
            .critical_columns(["CustomerID", "Name"])
            .trim_columns(["Name"])
            .fill_value(FillValue::text("N/A"))
            .date(DateColumnConfig {
                column: "JoinDate".to_string(),
                format_hint: None,
                output_column: Some("StandardDateTime".to_string()),
                required: false,
            })
            .outlier(OutlierPolicy::mean_multiple("CustomerID", 1.5))
            .build_unchecked()
    }

    /// Products: product names trimmed, unit price filtered by IQR band.
    pub fn products() -> Self {
        EntityConfig::builder("products")
            .files("products_data.csv", "products_data_prepared.csv")
            .trim_columns(["ProductName"])
            .outlier(OutlierPolicy::iqr_band("UnitPrice"))
            .build_unchecked()
    }

    /// Sales: transaction id and a parseable sale date are required.
    pub fn sales() -> Self {
        EntityConfig::builder("sales")
            .files("sales_data.csv", "sales_data_prepared.csv")
            .critical_columns(["TransactionID", "SaleDate"])
            .fill_value(FillValue::text("Unknown"))
            .date(DateColumnConfig {
                required: true,
                ..DateColumnConfig::in_place("SaleDate")
            })
            .outlier(OutlierPolicy::mean_multiple("SaleAmount", 1.5))
            .build_unchecked()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        if self.name.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField("name".to_string()));
        }
        if self.raw_file.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField(format!(
                "{}.raw_file",
                self.name
            )));
        }
        if self.prepared_file.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField(format!(
                "{}.prepared_file",
                self.name
            )));
        }
        if let Some(OutlierPolicy::MeanMultipleThreshold { multiple, .. }) = &self.outlier
            && !(multiple.is_finite() && *multiple > 0.0)
        {
            return Err(ConfigValidationError::InvalidMultiple {
                entity: self.name.clone(),
                value: *multiple,
            });
        }
        Ok(())
    }

    /// Every column that must exist before scrubbing can start.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = self
            .critical_columns
            .iter()
            .chain(self.trim_columns.iter())
            .map(String::as_str)
            .collect();
        if let Some(date) = &self.date {
            columns.push(&date.column);
        }
        columns
    }
}

/// Builder for [`EntityConfig`] with fluent API.
#[derive(Debug)]
pub struct EntityConfigBuilder {
    config: EntityConfig,
}

impl EntityConfigBuilder {
    fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            config: EntityConfig {
                raw_file: format!("{}_data.csv", name),
                prepared_file: format!("{}_data_prepared.csv", name),
                name,
                critical_columns: Vec::new(),
                trim_columns: Vec::new(),
                fill_value: None,
                date: None,
                outlier: None,
            },
        }
    }

    /// Set the raw input and prepared output file names.
    pub fn files(mut self, raw: impl Into<String>, prepared: impl Into<String>) -> Self {
        self.config.raw_file = raw.into();
        self.config.prepared_file = prepared.into();
        self
    }

    pub fn critical_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.critical_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn trim_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.trim_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn fill_value(mut self, value: FillValue) -> Self {
        self.config.fill_value = Some(value);
        self
    }

    pub fn date(mut self, date: DateColumnConfig) -> Self {
        self.config.date = Some(date);
        self
    }

    pub fn outlier(mut self, policy: OutlierPolicy) -> Self {
        self.config.outlier = Some(policy);
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> std::result::Result<EntityConfig, ConfigValidationError> {
        self.config.validate()?;
        Ok(self.config)
    }

    fn build_unchecked(self) -> EntityConfig {
        self.config
    }
}

/// Configuration for a full pipeline run.
///
/// # Example
///
/// ```rust,ignore
/// use smart_sales::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .data_dir("data")
///     .slow_months([3, 10])
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding one raw file per entity.
    /// Default: "data/raw"
    pub raw_dir: PathBuf,

    /// Directory receiving one prepared file per entity.
    /// Default: "data/prepared"
    pub prepared_dir: PathBuf,

    /// SQLite warehouse file.
    /// Default: "data/dw/smart_sales.db"
    pub warehouse_path: PathBuf,

    /// Cube output file.
    /// Default: "data/olap_cubing_outputs/multidimensional_olap_cube.csv"
    pub cube_output_path: PathBuf,

    /// Directory receiving analysis results.
    /// Default: "data/results"
    pub results_dir: PathBuf,

    pub customers: EntityConfig,
    pub products: EntityConfig,
    pub sales: EntityConfig,

    /// Dimensions and metrics of the cube.
    pub cube: CubeSpec,

    /// Source-row identifier collected into the cube's traceability column.
    /// Default: "TransactionID"
    pub trace_column: String,

    /// Months (1-12) inspected by the underperforming-products analysis.
    /// Default: [3, 10]
    pub slow_months: Vec<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let data_dir = Path::new("data");
        Self {
            raw_dir: data_dir.join("raw"),
            prepared_dir: data_dir.join("prepared"),
            warehouse_path: data_dir.join("dw").join("smart_sales.db"),
            cube_output_path: data_dir
                .join("olap_cubing_outputs")
                .join("multidimensional_olap_cube.csv"),
            results_dir: data_dir.join("results"),
            customers: EntityConfig::customers(),
            products: EntityConfig::products(),
            sales: EntityConfig::sales(),
            cube: default_cube_spec(),
            trace_column: TRACE_SOURCE_COLUMN.to_string(),
            slow_months: vec![3, 10],
        }
    }
}

/// The sales cube: day of week, month, region, product and customer.
pub fn default_cube_spec() -> CubeSpec {
    CubeSpec::new(
        ["DayOfWeek", "Month", "Region", "ProductID", "CustomerID"],
        vec![
            MetricSpec::new("SaleAmount", ["sum", "mean"]),
            MetricSpec::new("TransactionID", ["count"]),
        ],
    )
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::SourceNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Raw input file of an entity.
    pub fn raw_path(&self, entity: &EntityConfig) -> PathBuf {
        self.raw_dir.join(&entity.raw_file)
    }

    /// Prepared output file of an entity.
    pub fn prepared_path(&self, entity: &EntityConfig) -> PathBuf {
        self.prepared_dir.join(&entity.prepared_file)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> std::result::Result<(), ConfigValidationError> {
        for entity in [&self.customers, &self.products, &self.sales] {
            entity.validate()?;
        }

        if self.trace_column.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField("trace_column".to_string()));
        }

        if let Some(month) = self.slow_months.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(ConfigValidationError::InvalidMonth(*month));
        }

        self.cube
            .validate()
            .map_err(|e| ConfigValidationError::InvalidCube(e.to_string()))?;

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Configuration field '{0}' must not be empty")]
    EmptyField(String),

    #[error("Invalid outlier multiple for '{entity}': {value} (must be a positive number)")]
    InvalidMultiple { entity: String, value: f64 },

    #[error("Invalid month: {0} (must be between 1 and 12)")]
    InvalidMonth(u32),

    #[error("Invalid cube specification: {0}")]
    InvalidCube(String),
}

impl From<ConfigValidationError> for PipelineError {
    fn from(e: ConfigValidationError) -> Self {
        PipelineError::InvalidConfig(e.to_string())
    }
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    base: Option<PipelineConfig>,
    data_dir: Option<PathBuf>,
    warehouse_path: Option<PathBuf>,
    cube_output_path: Option<PathBuf>,
    customers: Option<EntityConfig>,
    products: Option<EntityConfig>,
    sales: Option<EntityConfig>,
    cube: Option<CubeSpec>,
    trace_column: Option<String>,
    slow_months: Option<Vec<u32>>,
}

impl PipelineConfigBuilder {
    /// Start from an existing configuration (e.g. one loaded from JSON).
    pub fn base(mut self, config: PipelineConfig) -> Self {
        self.base = Some(config);
        self
    }

    /// Root data directory; derives the raw, prepared, warehouse, cube and
    /// results locations beneath it.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Override the warehouse file location.
    pub fn warehouse_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.warehouse_path = Some(path.into());
        self
    }

    /// Override the cube output file location.
    pub fn cube_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cube_output_path = Some(path.into());
        self
    }

    pub fn customers(mut self, config: EntityConfig) -> Self {
        self.customers = Some(config);
        self
    }

    pub fn products(mut self, config: EntityConfig) -> Self {
        self.products = Some(config);
        self
    }

    pub fn sales(mut self, config: EntityConfig) -> Self {
        self.sales = Some(config);
        self
    }

    pub fn cube(mut self, spec: CubeSpec) -> Self {
        self.cube = Some(spec);
        self
    }

    pub fn trace_column(mut self, column: impl Into<String>) -> Self {
        self.trace_column = Some(column.into());
        self
    }

    pub fn slow_months(mut self, months: impl IntoIterator<Item = u32>) -> Self {
        self.slow_months = Some(months.into_iter().collect());
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<PipelineConfig, ConfigValidationError> {
        let mut config = self.base.unwrap_or_default();

        if let Some(dir) = self.data_dir {
            config.raw_dir = dir.join("raw");
            config.prepared_dir = dir.join("prepared");
            config.warehouse_path = dir.join("dw").join("smart_sales.db");
            config.cube_output_path = dir
                .join("olap_cubing_outputs")
                .join("multidimensional_olap_cube.csv");
            config.results_dir = dir.join("results");
        }
        if let Some(path) = self.warehouse_path {
            config.warehouse_path = path;
        }
        if let Some(path) = self.cube_output_path {
            config.cube_output_path = path;
        }
        if let Some(customers) = self.customers {
            config.customers = customers;
        }
        if let Some(products) = self.products {
            config.products = products;
        }
        if let Some(sales) = self.sales {
            config.sales = sales;
        }
        if let Some(cube) = self.cube {
            config.cube = cube;
        }
        if let Some(column) = self.trace_column {
            config.trace_column = column;
        }
        if let Some(months) = self.slow_months {
            config.slow_months = months;
        }

        config.validate()?;
        Ok(config)
    }
}
