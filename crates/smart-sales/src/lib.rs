//! Smart Sales Warehouse Library
//!
//! A batch pipeline built with Rust and Polars that turns raw retail records
//! into a SQLite warehouse and a multidimensional OLAP cube.
//!
//! # Overview
//!
//! - **Scrubbing**: Per-entity cleaning of customers, products and sales
//!   (duplicates, whitespace, critical columns, missing values, dates,
//!   outliers) driven by an [`EntityConfig`]
//! - **Warehouse**: Full drop-and-reload of a fixed three-table SQLite schema
//! - **Cubing**: Grouping by a dimension tuple with per-cell traceability of
//!   the contributing transactions
//! - **Analysis**: Roll-up reports over the cube (weekday, month, region,
//!   slow-month products)
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use smart_sales::{CubeBuilder, EntityConfig, ScrubbingPipeline, WarehouseLoader};
//! use smart_sales::config::default_cube_spec;
//!
//! let customers = ScrubbingPipeline::new(EntityConfig::customers())?.scrub(raw_customers)?;
//! let products = ScrubbingPipeline::new(EntityConfig::products())?.scrub(raw_products)?;
//! let sales = ScrubbingPipeline::new(EntityConfig::sales())?.scrub(raw_sales)?;
//!
//! let summary = WarehouseLoader::new("data/dw/smart_sales.db")
//!     .load(&customers.data, &products.data, &sales.data)?;
//!
//! let cube = CubeBuilder::new()
//!     .trace_column("TransactionID")
//!     .build(&facts, &default_cube_spec())?;
//! ```
//!
//! # Running every stage
//!
//! [`pipeline::stages`] runs each stage against the files of a
//! [`PipelineConfig`]:
//!
//! ```rust,ignore
//! use smart_sales::PipelineConfig;
//! use smart_sales::pipeline::stages;
//!
//! let config = PipelineConfig::builder().data_dir("data").build()?;
//! stages::prepare(&config)?;
//! stages::load(&config)?;
//! stages::cube(&config)?;
//! stages::analyze(&config)?;
//! ```

pub mod analysis;
pub mod cleaner;
pub mod config;
pub mod cube;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod types;
pub mod utils;
pub mod warehouse;

// Re-exports for convenient access
pub use cleaner::{ConsistencyChecker, DateStandardizer, MissingValueFiller, OutlierPolicy};
pub use config::{
    ConfigValidationError, DateColumnConfig, EntityConfig, EntityConfigBuilder, PipelineConfig,
    PipelineConfigBuilder,
};
pub use cube::{AggFunc, Cube, CubeBuilder, CubeSpec, MetricSpec};
pub use error::{PipelineError, Result, ResultExt};
pub use pipeline::{PreparedData, ScrubbingPipeline, ScrubbingPipelineBuilder};
pub use types::{
    ColumnConsistency, ConsistencyReport, FillValue, FilterOutcome, LoadSummary, ScrubResult,
};
pub use warehouse::{Warehouse, WarehouseLoader};
