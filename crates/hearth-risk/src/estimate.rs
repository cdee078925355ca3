//! CAPM risk statistics.
//!
//! Beta is the sample covariance of asset and market returns over the sample
//! variance of market returns. Alpha is Jensen's alpha on the same realised
//! per-period values:
//!
//! ```text
//! alpha = mean(r_a - r_f) - beta * mean(r_m - r_f)
//! ```

use crate::error::{Result, RiskError};
use crate::leverage::ScenarioReturns;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Configuration for risk statistics estimation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Minimum number of aligned return periods (default: 2)
    pub min_observations: usize,

    /// Market variance at or below this is treated as zero (default: 1e-18)
    pub variance_floor: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_observations: 2,
            variance_floor: 1e-18,
        }
    }
}

/// Alpha and beta of one return series against the market.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskStatistics {
    /// Jensen's alpha per period
    pub alpha: f64,
    /// Market beta
    pub beta: f64,
}

impl RiskStatistics {
    /// Whether both magnitudes are at most `threshold`.
    pub fn within(&self, threshold: f64) -> bool {
        self.alpha.abs() <= threshold && self.beta.abs() <= threshold
    }
}

/// Closed-form CAPM estimator
#[derive(Debug, Clone, Default)]
pub struct RiskStatisticsEstimator {
    config: EstimatorConfig,
}

impl RiskStatisticsEstimator {
    /// Create a new estimator
    pub const fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Estimate alpha and beta from three date-aligned return series.
    ///
    /// # Arguments
    /// * `asset` - Equity returns of the property under one scenario
    /// * `market` - Market index returns
    /// * `risk_free` - Per-period risk-free rates
    ///
    /// # Errors
    /// * [`RiskError::Domain`] if the lengths differ or a value is not finite
    /// * [`RiskError::InsufficientData`] below `min_observations`
    /// * [`RiskError::DegenerateVariance`] if the market returns are flat
    pub fn estimate(
        &self,
        asset: ArrayView1<'_, f64>,
        market: ArrayView1<'_, f64>,
        risk_free: ArrayView1<'_, f64>,
    ) -> Result<RiskStatistics> {
        let n = asset.len();
        if market.len() != n || risk_free.len() != n {
            return Err(RiskError::Domain(format!(
                "return series lengths differ: asset {n}, market {}, risk-free {}",
                market.len(),
                risk_free.len()
            )));
        }

        let required = self.config.min_observations.max(2);
        if n < required {
            return Err(RiskError::InsufficientData {
                required,
                actual: n,
            });
        }

        if [asset.view(), market.view(), risk_free.view()]
            .iter()
            .any(|s| s.iter().any(|v| !v.is_finite()))
        {
            return Err(RiskError::Domain("return series contain non-finite values".into()));
        }

        let variance = sample_covariance(market, market);
        if variance.is_nan() || variance <= self.config.variance_floor {
            return Err(RiskError::DegenerateVariance {
                variance,
                observations: n,
            });
        }

        let beta = sample_covariance(asset, market) / variance;
        let excess_asset = (&asset - &risk_free).sum() / n as f64;
        let excess_market = (&market - &risk_free).sum() / n as f64;
        let alpha = excess_asset - beta * excess_market;

        Ok(RiskStatistics { alpha, beta })
    }

    /// Estimate statistics for one scenario's return series.
    pub fn estimate_returns(&self, returns: &ScenarioReturns) -> Result<RiskStatistics> {
        self.estimate(
            ArrayView1::from(&returns.asset),
            ArrayView1::from(&returns.market),
            ArrayView1::from(&returns.risk_free),
        )
    }
}

/// Unbiased sample covariance; callers guarantee equal lengths of at least 2.
fn sample_covariance(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    let n = x.len() as f64;
    let mean_x = x.sum() / n;
    let mean_y = y.sum() / n;

    x.iter()
        .zip(y.iter())
        .map(|(&a, &b)| (a - mean_x) * (b - mean_y))
        .sum::<f64>()
        / (n - 1.0)
}
