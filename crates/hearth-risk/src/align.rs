//! Nearest-date alignment of valuation histories onto reference series.
//!
//! Valuation dates fall on any calendar day while market and risk-free
//! series only have business days, so an exact-date join would lose most
//! rows. Each valuation date instead takes the reference sample closest to
//! it; when two samples are equally close the earlier one wins.
//!
//! Reference data is broadcast onto the valuation dates, never the other way
//! round: an [`AlignedFrame`] has exactly one row per deduplicated valuation.

use crate::error::{Result, RiskError};
use crate::reference::ReferenceSeriesCache;
use chrono::NaiveDate;
use hearth_data::{ReferenceSeries, ValuationPoint};
use serde::{Deserialize, Serialize};

/// Position of the market column in frames built by
/// [`TimeSeriesAligner::align_with_cache`].
pub const MARKET_COLUMN: usize = 0;

/// Position of the risk-free column in frames built by
/// [`TimeSeriesAligner::align_with_cache`].
pub const RISK_FREE_COLUMN: usize = 1;

/// Configuration for the aligner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignerConfig {
    /// A history must have strictly more than this many distinct dates
    /// (default: 3)
    pub min_history_points: usize,
    /// Largest distance in days between a valuation date and its matched
    /// reference sample (default: 10)
    pub max_join_gap_days: i64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            min_history_points: 3,
            max_join_gap_days: 10,
        }
    }
}

/// One valuation date with its matched reference values.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRow {
    /// Valuation date
    pub date: NaiveDate,
    /// Home value on that date
    pub home_value: f64,
    /// Matched value per reference series; `None` if unresolved
    pub matches: Vec<Option<f64>>,
}

impl AlignedRow {
    /// Whether every reference series resolved for this row.
    pub fn is_resolved(&self) -> bool {
        self.matches.iter().all(Option::is_some)
    }
}

/// A valuation history joined against one or more reference series.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFrame {
    reference_names: Vec<String>,
    rows: Vec<AlignedRow>,
}

impl AlignedFrame {
    /// Names of the joined reference series, in column order.
    pub fn reference_names(&self) -> &[String] {
        &self.reference_names
    }

    /// Rows in ascending date order.
    pub fn rows(&self) -> &[AlignedRow] {
        &self.rows
    }

    /// Number of rows.
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the frame has no rows.
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows where every join resolved.
    pub fn resolved_len(&self) -> usize {
        self.resolved_rows().count()
    }

    /// Rows where every join resolved, in date order.
    pub fn resolved_rows(&self) -> impl Iterator<Item = &AlignedRow> + '_ {
        self.rows.iter().filter(|r| r.is_resolved())
    }

    /// Home value of the first resolved row.
    pub fn initial_home_value(&self) -> Option<f64> {
        self.resolved_rows().next().map(|r| r.home_value)
    }
}

/// Joins valuation histories onto reference series by nearest date.
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesAligner {
    config: AlignerConfig,
}

impl TimeSeriesAligner {
    /// Create an aligner with the given configuration.
    pub const fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub const fn config(&self) -> &AlignerConfig {
        &self.config
    }

    /// Sort, deduplicate and validate a raw valuation history.
    ///
    /// Non-finite and non-positive values are discarded; of several values
    /// on one date the last supplied wins.
    pub fn normalize(&self, valuations: &[ValuationPoint]) -> Result<Vec<ValuationPoint>> {
        let mut points: Vec<ValuationPoint> = valuations
            .iter()
            .filter(|p| p.value.is_finite() && p.value > 0.0)
            .copied()
            .collect();
        points.sort_by_key(|p| p.date);

        let mut deduped: Vec<ValuationPoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => last.value = point.value,
                _ => deduped.push(point),
            }
        }

        if deduped.len() <= self.config.min_history_points {
            return Err(RiskError::InsufficientData {
                required: self.config.min_history_points + 1,
                actual: deduped.len(),
            });
        }

        Ok(deduped)
    }

    /// Join a valuation history against each reference series.
    pub fn align(
        &self,
        valuations: &[ValuationPoint],
        references: &[&ReferenceSeries],
    ) -> Result<AlignedFrame> {
        let points = self.normalize(valuations)?;

        let mut rows: Vec<AlignedRow> = points
            .iter()
            .map(|p| AlignedRow {
                date: p.date,
                home_value: p.value,
                matches: Vec::with_capacity(references.len()),
            })
            .collect();

        for series in references {
            if series.is_empty() {
                return Err(RiskError::JoinResolution {
                    series: series.name().to_string(),
                    reason: "reference series is empty".to_string(),
                });
            }

            let mut resolved = 0usize;
            for row in &mut rows {
                let matched = nearest(series.points(), row.date)
                    .filter(|(date, _)| {
                        (*date - row.date).num_days().abs() <= self.config.max_join_gap_days
                    })
                    .map(|(_, value)| value);
                resolved += usize::from(matched.is_some());
                row.matches.push(matched);
            }

            if resolved == 0 {
                return Err(RiskError::JoinResolution {
                    series: series.name().to_string(),
                    reason: format!(
                        "no sample within {} days of any valuation date ({} to {})",
                        self.config.max_join_gap_days,
                        points[0].date,
                        points[points.len() - 1].date
                    ),
                });
            }
        }

        Ok(AlignedFrame {
            reference_names: references.iter().map(|s| s.name().to_string()).collect(),
            rows,
        })
    }

    /// Join against the market and risk-free series of a batch cache, in
    /// that column order.
    pub fn align_with_cache(
        &self,
        valuations: &[ValuationPoint],
        cache: &ReferenceSeriesCache,
    ) -> Result<AlignedFrame> {
        self.align(valuations, &[cache.market(), cache.risk_free()])
    }
}

/// The sample closest to `date`; ties go to the earlier sample.
fn nearest(points: &[(NaiveDate, f64)], date: NaiveDate) -> Option<(NaiveDate, f64)> {
    let idx = points.partition_point(|(d, _)| *d < date);
    let after = points.get(idx).copied();
    let before = idx.checked_sub(1).and_then(|i| points.get(i)).copied();

    match (before, after) {
        (Some(b), Some(a)) => {
            if (a.0 - date) < (date - b.0) {
                Some(a)
            } else {
                Some(b)
            }
        }
        (b, a) => b.or(a),
    }
}
