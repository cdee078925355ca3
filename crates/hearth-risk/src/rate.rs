//! Rate conversion.
//!
//! Risk-free quotes are annualised yields while the pipeline works in
//! per-day returns. Conversion uses the decompounding formula
//! `(1 + r)^(1/p) - 1`, never `r / p`, because returns compound.

use crate::error::{Result, RiskError};

/// Calendar days per year, the default compounding frequency.
pub const DEFAULT_PERIODS_PER_YEAR: u32 = 365;

/// Convert an annual rate into the equivalent per-period compounding rate.
///
/// Negative rates are accepted; a rate of -100% or below has no real root
/// and fails with [`RiskError::Domain`].
///
/// # Examples
/// ```
/// use hearth_risk::deannualize;
///
/// let daily = deannualize(0.05, 365).unwrap();
/// assert!((daily - 0.000133681).abs() < 1e-9);
/// ```
pub fn deannualize(annual_rate: f64, periods_per_year: u32) -> Result<f64> {
    if !annual_rate.is_finite() {
        return Err(RiskError::Domain(format!(
            "annual rate must be finite, got {annual_rate}"
        )));
    }
    if annual_rate <= -1.0 {
        return Err(RiskError::Domain(format!(
            "annual rate {annual_rate} is at or below -100%"
        )));
    }
    if periods_per_year == 0 {
        return Err(RiskError::Domain(
            "periods per year must be positive".to_string(),
        ));
    }

    Ok((1.0 + annual_rate).powf(1.0 / f64::from(periods_per_year)) - 1.0)
}

/// Compound a per-period rate over `periods` periods.
pub fn compound(periodic_rate: f64, periods: u32) -> f64 {
    (1.0 + periodic_rate).powf(f64::from(periods)) - 1.0
}
