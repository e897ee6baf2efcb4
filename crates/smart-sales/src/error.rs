//! Custom error types for the scrubbing, warehouse and cube stages.
//!
//! This module provides the error hierarchy using `thiserror`. Per-row
//! problems (unparsable dates, a missing outlier column) never surface here:
//! they are absorbed by the stage that meets them. Everything in this enum is
//! structural and aborts the current run.
//!
//! Errors serialize as `{ code, message }` so the CLI can emit them as JSON.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required raw or reference file is missing.
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// A required column is absent or carries an incompatible type.
    #[error("Schema mismatch on column '{column}': {reason}")]
    SchemaMismatch { column: String, reason: String },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cube specification is malformed.
    #[error("Invalid cube specification: {0}")]
    InvalidCubeSpec(String),

    /// A warehouse operation failed.
    #[error("Warehouse error during {operation}: {source}")]
    Warehouse {
        operation: String,
        #[source]
        source: rusqlite::Error,
    },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Shorthand for a missing required column.
    pub fn missing_column(column: impl Into<String>, context: impl AsRef<str>) -> Self {
        PipelineError::SchemaMismatch {
            column: column.into(),
            reason: format!("required by {} but not present", context.as_ref()),
        }
    }

    /// Wrap a rusqlite error with the operation that produced it.
    pub fn warehouse(operation: impl Into<String>, source: rusqlite::Error) -> Self {
        PipelineError::Warehouse {
            operation: operation.into(),
            source,
        }
    }

    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code, used by the CLI's JSON output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SourceNotFound(_) => "SOURCE_NOT_FOUND",
            Self::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidCubeSpec(_) => "INVALID_CUBE_SPEC",
            Self::Warehouse { .. } => "WAREHOUSE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error came from the relational store.
    pub fn is_warehouse_error(&self) -> bool {
        match self {
            Self::Warehouse { .. } => true,
            Self::WithContext { source, .. } => source.is_warehouse_error(),
            _ => false,
        }
    }
}

impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            PipelineError::SourceNotFound(PathBuf::from("raw/x.csv")).error_code(),
            "SOURCE_NOT_FOUND"
        );
        assert_eq!(
            PipelineError::missing_column("Name", "customers scrub").error_code(),
            "SCHEMA_MISMATCH"
        );
    }

    #[test]
    fn test_missing_column_message() {
        let error = PipelineError::missing_column("SaleDate", "date standardization");
        let message = error.to_string();
        assert!(message.contains("SaleDate"));
        assert!(message.contains("date standardization"));
    }

    #[test]
    fn test_is_warehouse_error() {
        let error = PipelineError::warehouse(
            "insert",
            rusqlite::Error::InvalidColumnName("x".to_string()),
        )
        .with_context("Loading sales");
        assert!(error.is_warehouse_error());
        assert!(!PipelineError::InvalidConfig("bad".to_string()).is_warehouse_error());
    }

    #[test]
    fn test_error_serialization() {
        let error = PipelineError::InvalidCubeSpec("no dimensions".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("INVALID_CUBE_SPEC"));
        assert!(json.contains("no dimensions"));
    }

    #[test]
    fn test_with_context() {
        let error = PipelineError::missing_column("UnitPrice", "cube build")
            .with_context("During cubing");
        assert!(error.to_string().contains("During cubing"));
        assert_eq!(error.error_code(), "SCHEMA_MISMATCH");
    }
}
