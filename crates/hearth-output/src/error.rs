//! Errors for aggregate tables, persistence and export.

use thiserror::Error;

/// Result type for output operations.
pub type Result<T> = std::result::Result<T, OutputError>;

/// Errors that can occur while building, storing or exporting output.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Polars error (Parquet I/O or DataFrame construction).
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored or supplied columns do not match the configured scenarios.
    #[error("Schema mismatch: expected columns {expected:?}, found {found:?}")]
    SchemaMismatch {
        /// Columns implied by the configured scenarios
        expected: Vec<String>,
        /// Columns actually present
        found: Vec<String>,
    },

    /// A stored value could not be interpreted.
    #[error("Invalid value in column {column}: {reason}")]
    InvalidValue {
        /// Column name
        column: String,
        /// What was wrong
        reason: String,
    },

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}
