//! Error taxonomy for the estimation pipeline.
//!
//! Every variant is a per-property failure: a batch run records it as a
//! [`SkipReason`] and moves on to the next property.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for risk computations.
pub type Result<T> = std::result::Result<T, RiskError>;

/// Errors raised by the alignment, return and estimation steps.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// Too few observations to support a variance estimate
    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData {
        /// Required number of observations
        required: usize,
        /// Actual number of observations
        actual: usize,
    },

    /// Invalid input to a numeric primitive
    #[error("Domain error: {0}")]
    Domain(String),

    /// Market returns have zero sample variance, beta is undefined
    #[error("Degenerate market variance ({variance:e}) over {observations} observations")]
    DegenerateVariance {
        /// Observed sample variance
        variance: f64,
        /// Number of observations
        observations: usize,
    },

    /// A reference series cannot be matched onto the valuation dates
    #[error("Cannot resolve join against {series}: {reason}")]
    JoinResolution {
        /// Reference series name
        series: String,
        /// Why the join failed
        reason: String,
    },
}

impl RiskError {
    /// Skip reason recorded by a batch run for this error.
    pub const fn skip_reason(&self) -> SkipReason {
        match self {
            Self::InsufficientData { .. } => SkipReason::InsufficientData,
            Self::Domain(_) => SkipReason::Domain,
            Self::DegenerateVariance { .. } => SkipReason::DegenerateVariance,
            Self::JoinResolution { .. } => SkipReason::JoinResolution,
        }
    }
}

/// Why a property produced no aggregate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// History too short after deduplication
    InsufficientData,
    /// Invalid numeric input
    Domain,
    /// Zero market variance in every scenario
    DegenerateVariance,
    /// Reference series did not cover the history
    JoinResolution,
    /// Record carried no valuation history
    MissingHistory,
    /// Record could not be read or parsed
    Malformed,
    /// Statistics exceeded the outlier threshold
    Outlier,
}

impl SkipReason {
    /// All reasons in reporting order.
    pub const ALL: [Self; 7] = [
        Self::InsufficientData,
        Self::Domain,
        Self::DegenerateVariance,
        Self::JoinResolution,
        Self::MissingHistory,
        Self::Malformed,
        Self::Outlier,
    ];

    /// Stable snake_case name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient_data",
            Self::Domain => "domain",
            Self::DegenerateVariance => "degenerate_variance",
            Self::JoinResolution => "join_resolution",
            Self::MissingHistory => "missing_history",
            Self::Malformed => "malformed",
            Self::Outlier => "outlier",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_mapping() {
        let err = RiskError::InsufficientData {
            required: 4,
            actual: 2,
        };
        assert_eq!(err.skip_reason(), SkipReason::InsufficientData);
        assert_eq!(
            RiskError::Domain("x".into()).skip_reason(),
            SkipReason::Domain
        );
        assert_eq!(
            RiskError::DegenerateVariance {
                variance: 0.0,
                observations: 3
            }
            .skip_reason(),
            SkipReason::DegenerateVariance
        );
    }

    #[test]
    fn test_skip_reason_names_are_unique() {
        let mut names: Vec<_> = SkipReason::ALL.iter().map(SkipReason::as_str).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SkipReason::ALL.len());
    }
}
