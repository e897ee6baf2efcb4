//! CLI entry point for the smart-sales pipeline.

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde::Serialize;
use smart_sales::analysis::ReportFiles;
use smart_sales::pipeline::stages;
use smart_sales::{FilterOutcome, LoadSummary, PipelineConfig, ScrubResult};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Sales data scrubbing, warehouse loading and OLAP cubing",
    long_about = "Batch pipeline over a data directory laid out as:\n\n  \
                  raw/                    customers_data.csv, products_data.csv, sales_data.csv\n  \
                  prepared/               cleaned files written by `prepare`\n  \
                  dw/smart_sales.db       SQLite warehouse written by `load`\n  \
                  olap_cubing_outputs/    cube written by `cube`\n  \
                  results/                reports written by `analyze`\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  SMART_SALES_DATA_DIR    Default for --data-dir\n  \
                  RUST_LOG                Overrides --log-level\n\n\
                  EXAMPLES:\n  \
                  # Run every stage\n  \
                  smart-sales run\n\n  \
                  # Rebuild only the cube, with a custom config\n  \
                  smart-sales --config pipeline.json cube"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root data directory
    #[arg(long, global = true, env = "SMART_SALES_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// JSON configuration file (missing fields take defaults)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Only show warnings, errors and the final summary
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print the summary as JSON to stdout and disable logging
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Scrub the raw files into prepared files
    Prepare,
    /// Load the prepared files into the warehouse
    Load,
    /// Build the cube from the warehouse
    Cube,
    /// Write the cube reports
    Analyze,
    /// Run prepare, load, cube and analyze in order
    Run,
}

/// Initialize the tracing subscriber for logging.
///
/// With JSON output no subscriber is installed, so stdout only carries the
/// summary.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[derive(Debug, Serialize)]
struct ScrubSummary {
    entity: String,
    rows_before: usize,
    rows_after: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    outlier: Option<FilterOutcome>,
    actions: Vec<String>,
}

impl ScrubSummary {
    fn new(entity: &str, result: &ScrubResult) -> Self {
        Self {
            entity: entity.to_string(),
            rows_before: result.before.row_count,
            rows_after: result.after.row_count,
            outlier: result.outlier.clone(),
            actions: result.actions.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CubeSummary {
    path: PathBuf,
    rows: usize,
    columns: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AnalysisSummary {
    files: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    least_profitable_day: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    least_profitable_day_sales: Option<f64>,
}

impl From<ReportFiles> for AnalysisSummary {
    fn from(files: ReportFiles) -> Self {
        let paths = files.paths();
        let (day, sales) = files.least_profitable_day.unzip();
        Self {
            files: paths,
            least_profitable_day: day,
            least_profitable_day_sales: sales,
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct RunSummary {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    prepared: Vec<ScrubSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<LoadSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cube: Option<CubeSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<AnalysisSummary>,
}

fn build_config(cli: &Cli) -> smart_sales::Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder();
    if let Some(path) = &cli.config {
        builder = builder.base(PipelineConfig::from_json_file(path)?);
    }
    if let Some(dir) = &cli.data_dir {
        builder = builder.data_dir(dir);
    }
    Ok(builder.build()?)
}

fn run(command: Command, config: &PipelineConfig) -> smart_sales::Result<RunSummary> {
    let mut summary = RunSummary::default();
    let all = matches!(command, Command::Run);

    if all || matches!(command, Command::Prepare) {
        let prepared = stages::prepare(config)?;
        summary.prepared = vec![
            ScrubSummary::new(&config.customers.name, &prepared.customers),
            ScrubSummary::new(&config.products.name, &prepared.products),
            ScrubSummary::new(&config.sales.name, &prepared.sales),
        ];
    }

    if all || matches!(command, Command::Load) {
        summary.warehouse = Some(stages::load(config)?);
    }

    if all || matches!(command, Command::Cube) {
        let cube = stages::cube(config)?;
        summary.cube = Some(CubeSummary {
            path: config.cube_output_path.clone(),
            rows: cube.height(),
            columns: cube
                .data()
                .get_column_names()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        });
    }

    if all || matches!(command, Command::Analyze) {
        summary.analysis = Some(stages::analyze(config)?.into());
    }

    Ok(summary)
}

/// Human-readable summary.
///
/// Uses `println!` so the summary shows regardless of log level.
fn print_summary(summary: &RunSummary) {
    println!("\n{}", "=".repeat(60));
    println!("SMART SALES PIPELINE SUMMARY");
    println!("{}", "=".repeat(60));

    for scrub in &summary.prepared {
        println!(
            "  {:<10} {:>7} -> {:>7} rows",
            scrub.entity, scrub.rows_before, scrub.rows_after
        );
        for action in &scrub.actions {
            println!("      - {}", action);
        }
    }

    if let Some(load) = &summary.warehouse {
        println!(
            "  Warehouse: {} customers, {} products, {} sales",
            load.customer_rows, load.product_rows, load.sales_rows
        );
        if !load.dropped_tables.is_empty() {
            println!("      dropped tables: {}", load.dropped_tables.join(", "));
        }
    }

    if let Some(cube) = &summary.cube {
        println!("  Cube: {} rows -> {}", cube.rows, cube.path.display());
    }

    if let Some(analysis) = &summary.analysis {
        if let (Some(day), Some(sales)) = (
            &analysis.least_profitable_day,
            analysis.least_profitable_day_sales,
        ) {
            println!("  Least profitable day: {} (${:.2})", day, sales);
        }
        for file in &analysis.files {
            println!("      {}", file.display());
        }
    }
    println!("{}", "=".repeat(60));
}

fn main() -> Result<()> {
    // Load environment variables from .env file before clap reads them
    dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.quiet, cli.json);

    let outcome = build_config(&cli).and_then(|config| {
        info!(
            "Running {:?} with raw data from {}",
            cli.command,
            config.raw_dir.display()
        );
        run(cli.command, &config)
    });

    match outcome {
        Ok(summary) if cli.json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) if cli.json => {
            println!("{}", serde_json::to_string_pretty(&e)?);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Pipeline failed: {}", e);
            Err(e.into())
        }
    }
}
