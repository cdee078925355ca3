//! Equity and return series under financing scenarios.
//!
//! Rows whose market or risk-free join did not resolve are dropped first.
//! A financed purchase is then modelled per remaining row as
//!
//! ```text
//! equity_t = home_t - loan + down_payment - payment * (t + 1)
//! ```
//!
//! where `down_payment = fraction * home_0`, `loan = home_0 - down_payment`
//! and `payment` is the fixed monthly amortisation payment. Every kept row
//! counts as one payment period regardless of the calendar gap to the next.
//!
//! The all-cash scenario carries no loan and its equity is the home value
//! itself, so its return series is the plain home-price return series.

use crate::align::{AlignedFrame, AlignedRow, MARKET_COLUMN, RISK_FREE_COLUMN};
use crate::error::{Result, RiskError};
use crate::scenario::{FinancingScenario, ScenarioSet};
use chrono::NaiveDate;

const MONTHS_IN_YEAR: u32 = 12;

/// Fixed monthly payment of a fully amortising loan.
///
/// Uses `P * r(1+r)^n / ((1+r)^n - 1)` with `r = annual_rate / 12` and
/// `n = term_years * 12`. A zero rate repays the principal in equal parts.
///
/// # Examples
///
/// ```
/// use hearth_risk::monthly_mortgage_payment;
///
/// let payment = monthly_mortgage_payment(190_000.0, 0.06281, 30).unwrap();
/// assert!((payment - 1173.6).abs() < 1.0);
/// ```
pub fn monthly_mortgage_payment(principal: f64, annual_rate: f64, term_years: u32) -> Result<f64> {
    if !principal.is_finite() || principal < 0.0 {
        return Err(RiskError::Domain(format!("invalid loan principal {principal}")));
    }
    if term_years == 0 {
        return Err(RiskError::Domain("loan term must be at least one year".into()));
    }
    if !annual_rate.is_finite() || annual_rate <= -1.0 {
        return Err(RiskError::Domain(format!("invalid mortgage rate {annual_rate}")));
    }

    let n = f64::from(term_years * MONTHS_IN_YEAR);
    let r = annual_rate / f64::from(MONTHS_IN_YEAR);
    if r == 0.0 {
        return Ok(principal / n);
    }

    let growth = (1.0 + r).powf(n);
    Ok(principal * r * growth / (growth - 1.0))
}

/// Per-scenario return series on a common set of dates.
///
/// The three vectors always have the same length; only periods where the
/// asset, market and risk-free values are all defined are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioReturns {
    /// Resolved scenario label
    pub label: String,
    /// End date of each return period
    pub dates: Vec<NaiveDate>,
    /// Equity returns
    pub asset: Vec<f64>,
    /// Market index returns
    pub market: Vec<f64>,
    /// Daily risk-free rate matched at the period end
    pub risk_free: Vec<f64>,
}

impl ScenarioReturns {
    /// Number of return periods.
    pub const fn len(&self) -> usize {
        self.dates.len()
    }

    /// Whether no return period survived.
    pub const fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Arithmetic mean of the equity returns.
    pub fn mean_asset_return(&self) -> Option<f64> {
        (!self.asset.is_empty()).then(|| self.asset.iter().sum::<f64>() / self.asset.len() as f64)
    }
}

/// Builds equity return series for each financing scenario.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeveragedReturnBuilder;

impl LeveragedReturnBuilder {
    /// Create a builder.
    pub const fn new() -> Self {
        Self
    }

    /// Equity value at every resolved row of the frame for one scenario.
    ///
    /// The loan is sized on the first resolved row and one payment accrues
    /// per resolved row.
    pub fn equity_series(
        &self,
        frame: &AlignedFrame,
        scenario: &FinancingScenario,
    ) -> Result<Vec<f64>> {
        let Some(initial) = frame.initial_home_value() else {
            return Ok(Vec::new());
        };
        let homes: Vec<f64> = frame.resolved_rows().map(|r| r.home_value).collect();

        if scenario.is_all_cash() {
            return Ok(homes);
        }

        let down_payment = scenario.down_payment_fraction * initial;
        let loan = initial - down_payment;
        let payment =
            monthly_mortgage_payment(loan, scenario.annual_mortgage_rate, scenario.term_years)?;

        let mut cumulative = 0.0;
        Ok(homes
            .iter()
            .map(|home| {
                cumulative += payment;
                home - loan + down_payment - cumulative
            })
            .collect())
    }

    /// Build the return series of every scenario, in scenario order.
    ///
    /// The frame must have been produced by
    /// [`TimeSeriesAligner::align_with_cache`](crate::TimeSeriesAligner::align_with_cache)
    /// so that the market and risk-free columns are in place.
    pub fn build_returns(
        &self,
        frame: &AlignedFrame,
        scenarios: &ScenarioSet,
    ) -> Result<Vec<ScenarioReturns>> {
        if frame.reference_names().len() <= RISK_FREE_COLUMN {
            return Err(RiskError::Domain(format!(
                "aligned frame needs market and risk-free columns, got {:?}",
                frame.reference_names()
            )));
        }

        scenarios
            .iter()
            .map(|(label, scenario)| {
                let equity = self.equity_series(frame, scenario)?;
                Ok(self.scenario_returns(label, frame, &equity))
            })
            .collect()
    }

    fn scenario_returns(&self, label: &str, frame: &AlignedFrame, equity: &[f64]) -> ScenarioReturns {
        let rows: Vec<&AlignedRow> = frame.resolved_rows().collect();
        let periods = rows.len().saturating_sub(1);
        let mut out = ScenarioReturns {
            label: label.to_string(),
            dates: Vec::with_capacity(periods),
            asset: Vec::with_capacity(periods),
            market: Vec::with_capacity(periods),
            risk_free: Vec::with_capacity(periods),
        };

        for (i, pair) in rows.windows(2).enumerate() {
            let (prev, curr) = (pair[0], pair[1]);
            let (Some(prev_index), Some(curr_index), Some(rf)) = (
                prev.matches[MARKET_COLUMN],
                curr.matches[MARKET_COLUMN],
                curr.matches[RISK_FREE_COLUMN],
            ) else {
                continue;
            };

            let (Some(asset), Some(market)) = (
                pct_change(equity[i], equity[i + 1]),
                pct_change(prev_index, curr_index),
            ) else {
                continue;
            };
            if !rf.is_finite() {
                continue;
            }

            out.dates.push(curr.date);
            out.asset.push(asset);
            out.market.push(market);
            out.risk_free.push(rf);
        }

        tracing::trace!(
            label,
            rows = rows.len(),
            periods = out.len(),
            "Built scenario returns"
        );
        out
    }
}

fn pct_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    let change = current / previous - 1.0;
    change.is_finite().then_some(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::TimeSeriesAligner;
    use crate::reference::ReferenceSeriesCache;
    use approx::assert_relative_eq;
    use chrono::Duration;
    use hearth_data::{ReferenceSeries, ValuationPoint};
    use rstest::rstest;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n)
    }

    fn flat_cache(days: i64) -> ReferenceSeriesCache {
        ReferenceSeriesCache::new(
            ReferenceSeries::new("SPY", (0..=days).map(|n| (day(n), 100.0))),
            ReferenceSeries::new("^IRX", (0..=days).map(|n| (day(n), 0.0))),
        )
    }

    fn example_frame() -> AlignedFrame {
        let valuations = vec![
            ValuationPoint::new(day(0), 200_000.0),
            ValuationPoint::new(day(30), 202_000.0),
            ValuationPoint::new(day(60), 201_000.0),
            ValuationPoint::new(day(90), 205_000.0),
        ];
        TimeSeriesAligner::default()
            .align_with_cache(&valuations, &flat_cache(90))
            .unwrap()
    }

    #[rstest]
    #[case(200_000.0, 0.06, 30, 1199.10)]
    #[case(100_000.0, 0.05, 15, 790.79)]
    #[case(120_000.0, 0.0, 10, 1000.0)]
    #[case(0.0, 0.06, 30, 0.0)]
    fn test_monthly_payment(
        #[case] principal: f64,
        #[case] rate: f64,
        #[case] years: u32,
        #[case] expected: f64,
    ) {
        let payment = monthly_mortgage_payment(principal, rate, years).unwrap();
        assert_relative_eq!(payment, expected, epsilon = 0.01);
    }

    #[test]
    fn test_monthly_payment_rejects_bad_input() {
        assert!(monthly_mortgage_payment(-1.0, 0.06, 30).is_err());
        assert!(monthly_mortgage_payment(1.0, 0.06, 0).is_err());
        assert!(monthly_mortgage_payment(1.0, f64::NAN, 30).is_err());
    }

    #[test]
    fn test_all_cash_returns_are_home_price_returns() {
        let frame = example_frame();
        let scenarios = ScenarioSet::default();
        let returns = LeveragedReturnBuilder::new()
            .build_returns(&frame, &scenarios)
            .unwrap();

        let all_cash = &returns[scenarios.index_of("all_cash").unwrap()];
        assert_eq!(all_cash.len(), 3);
        assert_relative_eq!(all_cash.asset[0], 0.01, epsilon = 1e-12);
        assert_relative_eq!(all_cash.asset[1], -0.004_950_495, epsilon = 1e-9);
        assert_relative_eq!(all_cash.asset[2], 0.019_900_498, epsilon = 1e-9);
        assert_relative_eq!(all_cash.mean_asset_return().unwrap(), 0.0083, epsilon = 1e-4);
        assert!(all_cash.market.iter().all(|&m| m == 0.0));
        assert!(all_cash.risk_free.iter().all(|&r| r == 0.0));
        assert_eq!(all_cash.dates, vec![day(30), day(60), day(90)]);
    }

    #[test]
    fn test_leveraged_equity_accumulates_one_payment_per_row() {
        let frame = example_frame();
        let scenario = FinancingScenario::new(0.05, 0.06281, 30);
        let equity = LeveragedReturnBuilder::new()
            .equity_series(&frame, &scenario)
            .unwrap();

        let payment = monthly_mortgage_payment(190_000.0, 0.06281, 30).unwrap();
        let expected = [
            200_000.0 - 190_000.0 + 10_000.0 - payment,
            202_000.0 - 190_000.0 + 10_000.0 - 2.0 * payment,
            201_000.0 - 190_000.0 + 10_000.0 - 3.0 * payment,
            205_000.0 - 190_000.0 + 10_000.0 - 4.0 * payment,
        ];
        for (got, want) in equity.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_leverage_amplifies_returns() {
        let frame = example_frame();
        let returns = LeveragedReturnBuilder::new()
            .build_returns(&frame, &ScenarioSet::default())
            .unwrap();
        let (levered, cash) = (&returns[0], &returns[1]);
        assert_eq!(levered.label, "5%_down");
        assert_eq!(levered.len(), cash.len());
        assert!(levered.asset[2] > cash.asset[2]);
    }

    #[test]
    fn test_unresolved_rows_are_skipped() {
        // Market only covers the first 40 days; day 60 and 90 fall outside the gap.
        let cache = ReferenceSeriesCache::new(
            ReferenceSeries::new("SPY", (0..=40).map(|n| (day(n), 100.0 + n as f64))),
            ReferenceSeries::new("^IRX", (0..=90).map(|n| (day(n), 0.0001))),
        );
        let valuations: Vec<_> = [0, 30, 60, 90]
            .iter()
            .map(|&n| ValuationPoint::new(day(n), 100.0 + n as f64))
            .collect();
        let frame = TimeSeriesAligner::default()
            .align_with_cache(&valuations, &cache)
            .unwrap();

        let returns = LeveragedReturnBuilder::new()
            .build_returns(&frame, &ScenarioSet::default())
            .unwrap();
        assert!(returns.iter().all(|r| r.len() == 1));
        assert_relative_eq!(returns[1].market[0], 130.0 / 100.0 - 1.0, epsilon = 1e-12);
        assert_relative_eq!(returns[1].risk_free[0], 0.0001);
    }

    /// Market covers days 0..=5 and 55..=95, so the day-30 valuation is
    /// 25 days from either side and stays unresolved.
    fn gapped_frame() -> AlignedFrame {
        let market_days = (0..=5).chain(55..=95);
        let cache = ReferenceSeriesCache::new(
            ReferenceSeries::new("SPY", market_days.map(|n| (day(n), 100.0 + n as f64))),
            ReferenceSeries::new("^IRX", (0..=95).map(|n| (day(n), 0.0001))),
        );
        let valuations: Vec<_> = [0, 30, 60, 90]
            .iter()
            .map(|&n| ValuationPoint::new(day(n), 200_000.0 + 1_000.0 * n as f64))
            .collect();
        TimeSeriesAligner::default()
            .align_with_cache(&valuations, &cache)
            .unwrap()
    }

    #[test]
    fn test_unresolved_middle_row_is_dropped_before_returns() {
        let frame = gapped_frame();
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.resolved_len(), 3);

        let returns = LeveragedReturnBuilder::new()
            .build_returns(&frame, &ScenarioSet::default())
            .unwrap();
        for scenario in &returns {
            assert_eq!(scenario.dates, vec![day(60), day(90)], "{}", scenario.label);
        }

        let all_cash = &returns[1];
        assert_relative_eq!(all_cash.asset[0], 260_000.0 / 200_000.0 - 1.0, epsilon = 1e-12);
        assert_relative_eq!(all_cash.market[0], 160.0 / 100.0 - 1.0, epsilon = 1e-12);
        assert_relative_eq!(all_cash.market[1], 190.0 / 160.0 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_payments_follow_resolved_rows() {
        let frame = gapped_frame();
        let scenario = FinancingScenario::new(0.05, 0.06281, 30);
        let equity = LeveragedReturnBuilder::new()
            .equity_series(&frame, &scenario)
            .unwrap();

        let payment = monthly_mortgage_payment(190_000.0, 0.06281, 30).unwrap();
        assert_eq!(equity.len(), 3);
        assert_relative_eq!(equity[0], 20_000.0 - payment, epsilon = 1e-6);
        assert_relative_eq!(equity[1], 80_000.0 - 2.0 * payment, epsilon = 1e-6);
        assert_relative_eq!(equity[2], 110_000.0 - 3.0 * payment, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_denominator_is_dropped() {
        assert_eq!(pct_change(0.0, 1.0), None);
        assert_eq!(pct_change(2.0, 3.0), Some(0.5));
    }

    #[test]
    fn test_requires_reference_columns() {
        let valuations: Vec<_> = (0..4).map(|n| ValuationPoint::new(day(n), 1.0)).collect();
        let market = ReferenceSeries::new("SPY", (0..4).map(|n| (day(n), 1.0)));
        let frame = TimeSeriesAligner::default()
            .align(&valuations, &[&market])
            .unwrap();
        let result = LeveragedReturnBuilder::new().build_returns(&frame, &ScenarioSet::default());
        assert!(matches!(result, Err(RiskError::Domain(_))));
    }
}
