//! Descriptive statistics of the aggregate table.
//!
//! Per numeric column: count, mean, sample standard deviation, min, the
//! quartiles and max. Nulls are ignored. Quantiles interpolate linearly
//! between order statistics.

use crate::aggregate::AggregateResult;
use serde::{Deserialize, Serialize};
use std::fmt;

const TABLE_WIDTH: usize = 96;

/// Statistics of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    /// Column name
    pub column: String,
    /// Number of non-null values
    pub count: usize,
    /// Arithmetic mean
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1 denominator)
    pub std: Option<f64>,
    /// Minimum
    pub min: Option<f64>,
    /// First quartile
    pub q25: Option<f64>,
    /// Median
    pub median: Option<f64>,
    /// Third quartile
    pub q75: Option<f64>,
    /// Maximum
    pub max: Option<f64>,
}

impl ColumnSummary {
    /// Summarize the non-null, finite values of a column.
    pub fn from_values(column: impl Into<String>, values: &[Option<f64>]) -> Self {
        let mut sorted: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = (count > 0).then(|| sorted.iter().sum::<f64>() / count as f64);
        let std = mean.filter(|_| count > 1).map(|m| {
            let ss: f64 = sorted.iter().map(|v| (v - m).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        });

        Self {
            column: column.into(),
            count,
            mean,
            std,
            min: sorted.first().copied(),
            q25: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q75: quantile(&sorted, 0.75),
            max: sorted.last().copied(),
        }
    }
}

/// Linear-interpolation quantile of sorted data.
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Statistics for every numeric column of an aggregate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptiveSummary {
    /// Number of rows in the table
    pub rows: usize,
    /// One entry per numeric column, in table order
    pub columns: Vec<ColumnSummary>,
}

impl DescriptiveSummary {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnSummary> {
        self.columns.iter().find(|c| c.column == name)
    }

    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("\nAggregate Summary ({} properties)\n", self.rows));
        output.push_str(&"=".repeat(TABLE_WIDTH));
        output.push('\n');
        output.push_str(&format!(
            "{:<20} {:>7} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
            "Column", "Count", "Mean", "Std", "Min", "25%", "50%", "75%", "Max"
        ));
        output.push_str(&"-".repeat(TABLE_WIDTH));
        output.push('\n');

        for c in &self.columns {
            output.push_str(&format!(
                "{:<20} {:>7} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}\n",
                c.column,
                c.count,
                cell(c.mean),
                cell(c.std),
                cell(c.min),
                cell(c.q25),
                cell(c.median),
                cell(c.q75),
                cell(c.max)
            ));
        }

        output.push_str(&"=".repeat(TABLE_WIDTH));
        output.push('\n');
        output
    }
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

impl fmt::Display for DescriptiveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ascii_table())
    }
}

/// Describe every numeric column of `result`.
pub fn describe(result: &AggregateResult) -> DescriptiveSummary {
    let columns = result
        .schema()
        .numeric_columns()
        .into_iter()
        .enumerate()
        .map(|(index, name)| ColumnSummary::from_values(name, &result.column_values(index)))
        .collect();

    DescriptiveSummary {
        rows: result.len(),
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregateSchema, PropertyRiskRow};
    use approx::assert_relative_eq;
    use hearth_risk::{RiskStatistics, ScenarioSet};
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 1.0)]
    #[case(0.25, 1.75)]
    #[case(0.5, 2.5)]
    #[case(0.75, 3.25)]
    #[case(1.0, 4.0)]
    fn test_quantile_interpolates(#[case] q: f64, #[case] expected: f64) {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(quantile(&sorted, q).unwrap(), expected);
    }

    #[test]
    fn test_column_summary() {
        let values = [Some(4.0), None, Some(1.0), Some(3.0), Some(2.0)];
        let summary = ColumnSummary::from_values("Beta", &values);

        assert_eq!(summary.count, 4);
        assert_relative_eq!(summary.mean.unwrap(), 2.5);
        assert_relative_eq!(summary.std.unwrap(), (5.0_f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_eq!(summary.min, Some(1.0));
        assert_relative_eq!(summary.median.unwrap(), 2.5);
        assert_eq!(summary.max, Some(4.0));
    }

    #[test]
    fn test_single_value_has_no_std() {
        let summary = ColumnSummary::from_values("Alpha", &[Some(0.3)]);
        assert_eq!(summary.count, 1);
        assert_eq!(summary.std, None);
        assert_eq!(summary.q25, Some(0.3));
    }

    #[test]
    fn test_empty_column() {
        let summary = ColumnSummary::from_values("Alpha", &[None, None]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.mean, None);
        assert_eq!(summary.max, None);
    }

    #[test]
    fn test_describe_table() {
        let mut result = AggregateResult::new(AggregateSchema::from_scenarios(&ScenarioSet::default()));
        for (id, beta) in [("1", 0.2), ("2", 0.4)] {
            let stats = RiskStatistics { alpha: 0.01, beta };
            result
                .push(PropertyRiskRow::new(id, vec![None, Some(stats)]))
                .unwrap();
        }

        let summary = describe(&result);
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.columns.len(), 4);
        assert_eq!(summary.column("5%_down_Alpha").unwrap().count, 0);
        assert_relative_eq!(summary.column("Beta").unwrap().mean.unwrap(), 0.3, epsilon = 1e-12);

        let table = summary.to_ascii_table();
        assert!(table.contains("Aggregate Summary (2 properties)"));
        assert!(table.contains("5%_down_Beta"));
        assert!(table.contains("0.3000"));
    }
}
