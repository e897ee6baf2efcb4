//! End-to-end stages over the configured data directory.
//!
//! Each stage reads the previous stage's files, so any stage can be rerun
//! on its own.

use super::ScrubbingPipeline;
use crate::analysis::{ReportFiles, write_reports};
use crate::config::{EntityConfig, PipelineConfig};
use crate::cube::enrich::{add_date_parts, left_join_attribute};
use crate::cube::{Cube, CubeBuilder};
use crate::error::{PipelineError, Result, ResultExt};
use crate::io::read_csv;
use crate::types::{LoadSummary, ScrubResult};
use crate::warehouse::{Warehouse, WarehouseLoader};
use tracing::info;

/// Scrub results for the three entities.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub customers: ScrubResult,
    pub products: ScrubResult,
    pub sales: ScrubResult,
}

/// Scrub every raw file and write the prepared files.
pub fn prepare(config: &PipelineConfig) -> Result<PreparedData> {
    info!("Starting data preparation...");
    let scrub = |entity: &EntityConfig| -> Result<ScrubResult> {
        ScrubbingPipeline::new(entity.clone())?
            .scrub_file(config.raw_path(entity), config.prepared_path(entity))
    };

    let prepared = PreparedData {
        customers: scrub(&config.customers)?,
        products: scrub(&config.products)?,
        sales: scrub(&config.sales)?,
    };
    info!("Data preparation complete");
    Ok(prepared)
}

/// Load the prepared files into the warehouse.
pub fn load(config: &PipelineConfig) -> Result<LoadSummary> {
    let customers = read_csv(config.prepared_path(&config.customers))?;
    let products = read_csv(config.prepared_path(&config.products))?;
    let sales = read_csv(config.prepared_path(&config.sales))?;

    WarehouseLoader::new(&config.warehouse_path)
        .load(&customers, &products, &sales)
        .context("Failed to load the warehouse")
}

/// Build the cube from the warehouse sales table and write it.
///
/// Sales are enriched with the customer `Region` and with day-of-week,
/// month and year parts of `SaleDate` before grouping.
pub fn cube(config: &PipelineConfig) -> Result<Cube> {
    info!("Starting OLAP cubing...");
    if !config.warehouse_path.exists() {
        return Err(PipelineError::SourceNotFound(config.warehouse_path.clone()));
    }
    let sales = {
        let warehouse = Warehouse::open(&config.warehouse_path)?;
        warehouse.read_table("sales")?
    };
    let customers = read_csv(config.prepared_path(&config.customers))?;

    let facts = left_join_attribute(&sales, &customers, "CustomerID", &["Region"])?;
    let facts = add_date_parts(&facts, "SaleDate")?;

    let cube = CubeBuilder::new()
        .trace_column(&config.trace_column)
        .build(&facts, &config.cube)?;
    cube.write_csv(&config.cube_output_path)?;
    Ok(cube)
}

/// Run the cube reports and write them under the results directory.
pub fn analyze(config: &PipelineConfig) -> Result<ReportFiles> {
    let cube = read_csv(&config.cube_output_path)?;
    let products = read_csv(config.prepared_path(&config.products))?;
    let customers = read_csv(config.prepared_path(&config.customers))?;
    write_reports(
        &cube,
        &products,
        &customers,
        &config.slow_months,
        &config.results_dir,
    )
}
