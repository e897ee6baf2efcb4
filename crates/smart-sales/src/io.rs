//! CSV input and output.

use crate::error::{PipelineError, Result, ResultExt};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Read a headered CSV file.
///
/// A missing file is reported as [`PipelineError::SourceNotFound`] rather
/// than a generic IO error.
pub fn read_csv(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PipelineError::SourceNotFound(path.to_path_buf()));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .context(format!("Failed to open {}", path.display()))?
        .finish()
        .context(format!("Failed to parse {}", path.display()))?;

    debug!(
        "Read {} rows x {} columns from {}",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}

/// Write a DataFrame as headered CSV, creating parent directories.
pub fn write_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)
        .context(format!("Failed to write {}", path.display()))?;

    debug!("Wrote {} rows to {}", df.height(), path.display());
    Ok(())
}
