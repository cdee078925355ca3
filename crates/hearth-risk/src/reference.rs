//! Read-only reference series shared by a batch run.

use crate::error::{Result, RiskError};
use crate::rate::deannualize;
use chrono::NaiveDate;
use hearth_data::ReferenceSeries;

/// Market index levels and daily risk-free rates for one batch run.
///
/// Loaded once before any property is processed and only ever borrowed
/// afterwards, so it can be shared across worker threads without locking.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSeriesCache {
    market: ReferenceSeries,
    risk_free: ReferenceSeries,
}

impl ReferenceSeriesCache {
    /// Build from a market series and a risk-free series already expressed
    /// as per-day rates.
    pub const fn new(market: ReferenceSeries, risk_free_daily: ReferenceSeries) -> Self {
        Self {
            market,
            risk_free: risk_free_daily,
        }
    }

    /// Build from annualised risk-free rates given as fractions.
    pub fn from_annualized(
        market: ReferenceSeries,
        risk_free_annual: &ReferenceSeries,
        periods_per_year: u32,
    ) -> Result<Self> {
        let risk_free = risk_free_annual.try_map_values(|r| deannualize(r, periods_per_year))?;
        Ok(Self::new(market, risk_free))
    }

    /// Build from annualised risk-free quotes in percent, as T-bill yield
    /// tickers such as `^IRX` are quoted.
    pub fn from_annualized_percent(
        market: ReferenceSeries,
        risk_free_percent: &ReferenceSeries,
        periods_per_year: u32,
    ) -> Result<Self> {
        let risk_free =
            risk_free_percent.try_map_values(|pct| deannualize(pct / 100.0, periods_per_year))?;
        Ok(Self::new(market, risk_free))
    }

    /// Market index levels.
    pub const fn market(&self) -> &ReferenceSeries {
        &self.market
    }

    /// Daily risk-free rates.
    pub const fn risk_free(&self) -> &ReferenceSeries {
        &self.risk_free
    }

    /// Date span covered by both series.
    pub fn common_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = self.market.first_date()?.max(self.risk_free.first_date()?);
        let end = self.market.last_date()?.min(self.risk_free.last_date()?);
        (start <= end).then_some((start, end))
    }

    /// Fail unless both series carry data.
    pub fn ensure_loaded(&self) -> Result<()> {
        for series in [&self.market, &self.risk_free] {
            if series.is_empty() {
                return Err(RiskError::JoinResolution {
                    series: series.name().to_string(),
                    reason: "reference series is empty".to_string(),
                });
            }
        }
        Ok(())
    }
}
