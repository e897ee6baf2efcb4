//! Per-entity scrubbing pipeline.
//!
//! This module provides the `ScrubbingPipeline` struct and builder that
//! chain the cleaning components over one raw dataset.

use crate::cleaner::sanitizers::{
    drop_duplicate_rows, drop_rows_missing, trim_column_names, trim_string_columns,
};
use crate::cleaner::{ConsistencyChecker, DateStandardizer, MissingValueFiller};
use crate::config::EntityConfig;
use crate::error::{PipelineError, Result, ResultExt};
use crate::io::{read_csv, write_csv};
use crate::types::{FilterOutcome, ScrubResult};
use crate::utils::require_columns;
use polars::prelude::*;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Scrubs one entity's dataset according to its [`EntityConfig`].
///
/// Steps always run in the same order:
///
/// 1. Trim column names
/// 2. Drop exact duplicate rows
/// 3. Trim configured text columns
/// 4. Drop rows missing a critical column
/// 5. Snapshot ("before")
/// 6. Fill remaining missing cells
/// 7. Standardize the date column (dropping unparsable rows if required)
/// 8. Apply the outlier policy
/// 9. Snapshot ("after")
///
/// # Example
///
/// ```rust,ignore
/// use smart_sales::{EntityConfig, ScrubbingPipeline};
///
/// let result = ScrubbingPipeline::builder()
///     .entity(EntityConfig::sales())
///     .build()?
///     .scrub(raw_sales)?;
///
/// println!("{} rows removed", result.rows_removed());
/// ```
#[derive(Debug, Clone)]
pub struct ScrubbingPipeline {
    entity: EntityConfig,
}

static_assertions::assert_impl_all!(ScrubbingPipeline: Send, Sync);

impl ScrubbingPipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> ScrubbingPipelineBuilder {
        ScrubbingPipelineBuilder::default()
    }

    /// Create a pipeline for one entity, validating its configuration.
    pub fn new(entity: EntityConfig) -> Result<Self> {
        entity.validate()?;
        Ok(Self { entity })
    }

    pub fn entity(&self) -> &EntityConfig {
        &self.entity
    }

    /// Scrub a raw dataset.
    pub fn scrub(&self, df: DataFrame) -> Result<ScrubResult> {
        match self.scrub_internal(df) {
            Ok(result) => Ok(result),
            Err(e) => {
                error!("Scrubbing '{}' failed: {}", self.entity.name, e);
                Err(e)
            }
        }
    }

    /// Read the raw file, scrub it and write the prepared file.
    pub fn scrub_file(&self, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<ScrubResult> {
        let input = input.as_ref();
        let output = output.as_ref();

        info!("Reading raw {} data from {}", self.entity.name, input.display());
        let df = read_csv(input)?;
        let mut result = self
            .scrub(df)
            .context(format!("Failed to scrub {}", input.display()))?;

        write_csv(&mut result.data, output)?;
        info!(
            "Wrote prepared {} data to {} ({} rows)",
            self.entity.name,
            output.display(),
            result.data.height()
        );
        Ok(result)
    }

    fn scrub_internal(&self, df: DataFrame) -> Result<ScrubResult> {
        let start_time = Instant::now();
        let name = &self.entity.name;
        let mut actions: Vec<String> = Vec::new();

        info!(
            "Scrubbing {} ({} rows x {} columns)...",
            name,
            df.height(),
            df.width()
        );

        // Step 1: Trim column names
        debug!("Step 1: Trimming column names...");
        let df = trim_column_names(df)?;
        require_columns(&df, &self.entity.required_columns(), "entity configuration")?;

        // Step 2: Drop duplicates
        debug!("Step 2: Removing duplicate rows...");
        let (df, duplicates) = drop_duplicate_rows(df)?;
        if duplicates > 0 {
            actions.push(format!("Removed {} duplicate rows", duplicates));
        }

        // Step 3: Trim text columns
        let df = if self.entity.trim_columns.is_empty() {
            df
        } else {
            debug!("Step 3: Trimming whitespace in {:?}...", self.entity.trim_columns);
            actions.push(format!(
                "Trimmed whitespace in {}",
                self.entity.trim_columns.join(", ")
            ));
            trim_string_columns(df, &self.entity.trim_columns)?
        };

        // Step 4: Critical columns
        let (df, missing_critical) = drop_rows_missing(df, &self.entity.critical_columns)?;
        if missing_critical > 0 {
            debug!(
                "Step 4: Dropped {} rows missing {:?}",
                missing_critical, self.entity.critical_columns
            );
            actions.push(format!(
                "Removed {} rows missing a value in {}",
                missing_critical,
                self.entity.critical_columns.join(", ")
            ));
        }

        // Step 5: Snapshot before
        let before = ConsistencyChecker::snapshot(&df)?;
        info!(
            "Snapshot before cleaning: {} rows, {} missing cells",
            before.row_count,
            before.total_nulls()
        );

        // Step 6: Fill missing values
        let df = match &self.entity.fill_value {
            Some(value) if before.total_nulls() > 0 => {
                debug!("Step 6: Filling missing values with '{}'...", value);
                actions.push(format!(
                    "Filled {} missing values with '{}'",
                    before.total_nulls(),
                    value
                ));
                MissingValueFiller::fill(df, value)?
            }
            _ => df,
        };

        // Step 7: Standardize dates
        let df = match &self.entity.date {
            Some(date) => {
                let mut standardizer = DateStandardizer::new(&date.column);
                if let Some(format) = &date.format_hint {
                    standardizer = standardizer.format_hint(format);
                }
                if let Some(output) = &date.output_column {
                    standardizer = standardizer.output_column(output);
                }

                debug!("Step 7: Standardizing dates in '{}'...", date.column);
                let df = standardizer.standardize(&df)?;
                let target = standardizer.target_column().to_string();
                let unparsed = df.column(&target)?.null_count();
                actions.push(format!(
                    "Standardized dates in '{}' into '{}'",
                    date.column, target
                ));

                if date.required && unparsed > 0 {
                    let (df, removed) = drop_rows_missing(df, &[target.as_str()])?;
                    actions.push(format!(
                        "Removed {} rows with an unparsable '{}'",
                        removed, date.column
                    ));
                    df
                } else {
                    if unparsed > 0 {
                        warn!(
                            "{} values in '{}' could not be parsed as dates",
                            unparsed, date.column
                        );
                    }
                    df
                }
            }
            None => df,
        };

        // Step 8: Outliers
        let (df, outlier) = match &self.entity.outlier {
            Some(policy) => {
                debug!("Step 8: Applying outlier policy to '{}'...", policy.column());
                let (df, outcome) = policy.apply(df)?;
                match &outcome {
                    FilterOutcome::Applied { rows_removed, .. } => actions.push(format!(
                        "Removed {} outlier rows in '{}'",
                        rows_removed,
                        policy.column()
                    )),
                    FilterOutcome::Skipped { warning, .. } => actions.push(warning.clone()),
                }
                (df, Some(outcome))
            }
            None => (df, None),
        };

        // Step 9: Snapshot after
        let after = ConsistencyChecker::snapshot(&df)?;

        info!(
            "Scrubbed {}: {} -> {} rows in {:.2}s",
            name,
            before.row_count,
            after.row_count,
            start_time.elapsed().as_secs_f64()
        );

        Ok(ScrubResult {
            data: df,
            before,
            after,
            outlier,
            actions,
        })
    }
}

/// Builder for [`ScrubbingPipeline`].
#[derive(Debug, Default)]
pub struct ScrubbingPipelineBuilder {
    entity: Option<EntityConfig>,
}

impl ScrubbingPipelineBuilder {
    /// Set the entity configuration.
    pub fn entity(mut self, entity: EntityConfig) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if no entity was set or its configuration is invalid.
    pub fn build(self) -> Result<ScrubbingPipeline> {
        let entity = self.entity.ok_or_else(|| {
            PipelineError::InvalidConfig("no entity configuration provided".to_string())
        })?;
        ScrubbingPipeline::new(entity)
    }
}
