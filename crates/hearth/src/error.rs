//! Top-level error type.

use thiserror::Error;

/// Result type for pipeline-level operations.
pub type Result<T> = std::result::Result<T, HearthError>;

/// Errors that abort a whole run, as opposed to skipping one property.
#[derive(Debug, Error)]
pub enum HearthError {
    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Input data error
    #[error(transparent)]
    Data(#[from] hearth_data::DataError),

    /// Reference data unusable for the run
    #[error(transparent)]
    Risk(#[from] hearth_risk::RiskError),

    /// Output could not be loaded or written
    #[error(transparent)]
    Output(#[from] hearth_output::OutputError),
}
