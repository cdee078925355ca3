//! Date-indexed series consumed by the estimation pipeline.
//!
//! A [`ReferenceSeries`] is always sorted by date with one value per date, so
//! downstream nearest-date lookups can binary search it.

use crate::error::{DataError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single home valuation on a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationPoint {
    /// Valuation date (time of day already stripped).
    pub date: NaiveDate,
    /// Estimated home value.
    pub value: f64,
}

impl ValuationPoint {
    /// Create a new valuation point.
    pub const fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// A named, date-sorted numeric series such as daily index levels or
/// risk-free quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSeries {
    name: String,
    points: Vec<(NaiveDate, f64)>,
}

impl ReferenceSeries {
    /// Build a series from unordered points.
    ///
    /// Non-finite values are dropped, points are sorted by date and duplicate
    /// dates keep the last value supplied.
    pub fn new(name: impl Into<String>, points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let mut points: Vec<_> = points.into_iter().filter(|(_, v)| v.is_finite()).collect();
        points.sort_by_key(|(date, _)| *date);

        let mut deduped: Vec<(NaiveDate, f64)> = Vec::with_capacity(points.len());
        for (date, value) in points {
            match deduped.last_mut() {
                Some(last) if last.0 == date => last.1 = value,
                _ => deduped.push((date, value)),
            }
        }

        Self {
            name: name.into(),
            points: deduped,
        }
    }

    /// Series name (ticker or file stem).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sorted `(date, value)` points.
    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    /// Number of points.
    pub const fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series has no points.
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// First date covered.
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|(d, _)| *d)
    }

    /// Last date covered.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|(d, _)| *d)
    }

    /// Value recorded on exactly `date`.
    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&date, |(d, _)| *d)
            .ok()
            .map(|i| self.points[i].1)
    }

    /// Points within `[start, end]`.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let lo = self.points.partition_point(|(d, _)| *d < start);
        let hi = self.points.partition_point(|(d, _)| *d <= end);
        Self {
            name: self.name.clone(),
            points: self.points[lo..hi.max(lo)].to_vec(),
        }
    }

    /// Transform every value, failing on the first error.
    pub fn try_map_values<E>(
        &self,
        mut f: impl FnMut(f64) -> std::result::Result<f64, E>,
    ) -> std::result::Result<Self, E> {
        let points = self
            .points
            .iter()
            .map(|&(date, value)| f(value).map(|v| (date, v)))
            .collect::<std::result::Result<Vec<_>, E>>()?;
        Ok(Self::new(self.name.clone(), points))
    }
}

/// Parse a date from the textual forms found in scraped records and
/// provider downloads.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps, `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS` and `MM/DD/YYYY`. Time of day is discarded.
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(dt.date());
        }
    }
    NaiveDate::parse_from_str(text, "%m/%d/%Y")
        .map_err(|_| DataError::Parse(format!("Unrecognised date: {text:?}")))
}

/// Load a reference series from a CSV file.
///
/// The file needs a header row. The first column is the date and the value
/// is read from a column named `value`, `adj_close`, `Adj Close` or `close`
/// (first match), falling back to the second column. Rows with an empty or
/// non-numeric value (provider placeholders such as `null`) are skipped.
pub fn load_series_csv<P: AsRef<Path>>(path: P, name: &str) -> Result<ReferenceSeries> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let headers = reader.headers()?.clone();

    let value_idx = ["value", "adj_close", "Adj Close", "adjusted_close", "close", "Close"]
        .iter()
        .find_map(|candidate| headers.iter().position(|h| h.trim() == *candidate))
        .unwrap_or(1);

    let mut points = Vec::new();
    for record in reader.records() {
        let record = record?;
        let Some(date_text) = record.get(0) else {
            continue;
        };
        let date = parse_date(date_text)?;
        if let Some(value) = record.get(value_idx).and_then(|v| v.trim().parse::<f64>().ok()) {
            points.push((date, value));
        }
    }

    if points.is_empty() {
        return Err(DataError::MissingData {
            symbol: name.to_string(),
            reason: format!("no numeric rows in {}", path.as_ref().display()),
        });
    }

    Ok(ReferenceSeries::new(name, points))
}
