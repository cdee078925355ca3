//! The per-property alpha/beta table.
//!
//! One row per property id, one alpha and one beta column per financing
//! scenario. Column names are fixed when the [`AggregateSchema`] is built
//! from a [`ScenarioSet`]: the all-cash scenario owns the unsuffixed
//! `Alpha`/`Beta` columns, every other scenario gets `{label}_Alpha` and
//! `{label}_Beta`.

use crate::error::{OutputError, Result};
use hearth_risk::{RiskStatistics, ScenarioSet};
use polars::prelude::*;
use std::collections::HashSet;

/// Name of the key column.
pub const PROPERTY_ID_COLUMN: &str = "property_id";

/// Column layout derived from the configured scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSchema {
    labels: Vec<String>,
    alpha_columns: Vec<String>,
    beta_columns: Vec<String>,
}

impl AggregateSchema {
    /// Resolve column names for every scenario, in scenario order.
    pub fn from_scenarios(scenarios: &ScenarioSet) -> Self {
        let mut schema = Self {
            labels: Vec::with_capacity(scenarios.len()),
            alpha_columns: Vec::with_capacity(scenarios.len()),
            beta_columns: Vec::with_capacity(scenarios.len()),
        };

        for (label, scenario) in scenarios.iter() {
            let (alpha, beta) = if scenario.is_all_cash() {
                ("Alpha".to_string(), "Beta".to_string())
            } else {
                (format!("{label}_Alpha"), format!("{label}_Beta"))
            };
            schema.labels.push(label.to_string());
            schema.alpha_columns.push(alpha);
            schema.beta_columns.push(beta);
        }

        schema
    }

    /// Scenario labels in column order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of scenarios.
    pub const fn scenario_count(&self) -> usize {
        self.labels.len()
    }

    /// Alpha column of scenario `index`.
    pub fn alpha_column(&self, index: usize) -> Option<&str> {
        self.alpha_columns.get(index).map(String::as_str)
    }

    /// Beta column of scenario `index`.
    pub fn beta_column(&self, index: usize) -> Option<&str> {
        self.beta_columns.get(index).map(String::as_str)
    }

    /// Numeric columns in table order (alpha then beta per scenario).
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.alpha_columns
            .iter()
            .zip(&self.beta_columns)
            .flat_map(|(a, b)| [a.as_str(), b.as_str()])
            .collect()
    }

    /// Every column in table order, key column first.
    pub fn column_names(&self) -> Vec<String> {
        std::iter::once(PROPERTY_ID_COLUMN)
            .chain(self.numeric_columns())
            .map(str::to_string)
            .collect()
    }

    /// Fail unless `found` lists exactly this schema's columns, in order.
    pub fn check_columns<S: AsRef<str>>(&self, found: &[S]) -> Result<()> {
        let expected = self.column_names();
        let matches = expected.len() == found.len()
            && expected.iter().zip(found).all(|(e, f)| e == f.as_ref());
        if matches {
            Ok(())
        } else {
            Err(OutputError::SchemaMismatch {
                expected,
                found: found.iter().map(|s| s.as_ref().to_string()).collect(),
            })
        }
    }
}

/// Statistics for one property, one entry per scenario.
///
/// `None` marks a scenario that could not be estimated (flat market
/// returns, for instance) while other scenarios for the property could.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRiskRow {
    /// Property identifier
    pub property_id: String,
    /// Per-scenario statistics in scenario order
    pub statistics: Vec<Option<RiskStatistics>>,
}

impl PropertyRiskRow {
    /// Create a row.
    pub fn new(property_id: impl Into<String>, statistics: Vec<Option<RiskStatistics>>) -> Self {
        Self {
            property_id: property_id.into(),
            statistics,
        }
    }

    /// Whether any present alpha or beta magnitude exceeds `threshold`.
    pub fn is_outlier(&self, threshold: f64) -> bool {
        self.statistics
            .iter()
            .flatten()
            .any(|s| !s.within(threshold))
    }

    /// Flattened numeric values (alpha then beta per scenario).
    pub fn values(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.statistics.iter().flat_map(|s| {
            [s.map(|s| s.alpha), s.map(|s| s.beta)]
        })
    }
}

/// Rows keyed by property id, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    schema: AggregateSchema,
    rows: Vec<PropertyRiskRow>,
    ids: HashSet<String>,
}

impl AggregateResult {
    /// Create an empty table.
    pub fn new(schema: AggregateSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// Column layout.
    pub const fn schema(&self) -> &AggregateSchema {
        &self.schema
    }

    /// Rows in insertion order.
    pub fn rows(&self) -> &[PropertyRiskRow] {
        &self.rows
    }

    /// Number of rows.
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether a property id is present.
    pub fn contains(&self, property_id: &str) -> bool {
        self.ids.contains(property_id)
    }

    /// Property ids in row order.
    pub fn property_ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.property_id.as_str())
    }

    /// Append a row unless its id is already present.
    ///
    /// Returns whether the row was added. Existing rows are never replaced.
    pub fn push(&mut self, row: PropertyRiskRow) -> Result<bool> {
        if row.statistics.len() != self.schema.scenario_count() {
            return Err(OutputError::InvalidValue {
                column: PROPERTY_ID_COLUMN.to_string(),
                reason: format!(
                    "row {} has {} scenarios, table has {}",
                    row.property_id,
                    row.statistics.len(),
                    self.schema.scenario_count()
                ),
            });
        }
        if !self.ids.insert(row.property_id.clone()) {
            return Ok(false);
        }
        self.rows.push(row);
        Ok(true)
    }

    /// Drop rows with any present `|alpha|` or `|beta|` above `threshold`.
    ///
    /// Returns the number of rows removed. Running it again with the same
    /// threshold removes nothing.
    pub fn filter_outliers(&mut self, threshold: f64) -> usize {
        let before = self.rows.len();
        let ids = &mut self.ids;
        self.rows.retain(|row| {
            let keep = !row.is_outlier(threshold);
            if !keep {
                ids.remove(&row.property_id);
            }
            keep
        });
        before - self.rows.len()
    }

    /// Append the rows of `other` whose ids are not yet present.
    ///
    /// Returns the number of rows appended.
    pub fn merge(&mut self, other: Self) -> Result<usize> {
        if other.schema != self.schema {
            return Err(OutputError::SchemaMismatch {
                expected: self.schema.column_names(),
                found: other.schema.column_names(),
            });
        }

        let mut appended = 0;
        for row in other.rows {
            appended += usize::from(self.push(row)?);
        }
        Ok(appended)
    }

    /// Values of numeric column `index` (see [`AggregateSchema::numeric_columns`]),
    /// nulls included.
    pub fn column_values(&self, index: usize) -> Vec<Option<f64>> {
        let scenario = index / 2;
        self.rows
            .iter()
            .map(|row| {
                row.statistics.get(scenario).copied().flatten().map(|s| {
                    if index % 2 == 0 { s.alpha } else { s.beta }
                })
            })
            .collect()
    }

    /// Convert to a polars DataFrame.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let ids: Vec<&str> = self.property_ids().collect();
        let mut columns: Vec<Column> = vec![Series::new(PROPERTY_ID_COLUMN.into(), ids).into()];

        for (index, name) in self.schema.numeric_columns().into_iter().enumerate() {
            columns.push(Series::new(name.into(), self.column_values(index)).into());
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Rebuild from a DataFrame written by [`Self::to_dataframe`].
    pub fn from_dataframe(df: &DataFrame, schema: AggregateSchema) -> Result<Self> {
        let found: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        schema.check_columns(&found)?;

        let ids = df.column(PROPERTY_ID_COLUMN)?.cast(&DataType::String)?;
        let ids = ids.str()?;

        let mut numeric = Vec::new();
        for name in schema.numeric_columns() {
            numeric.push(df.column(name)?.cast(&DataType::Float64)?);
        }
        let numeric = numeric
            .iter()
            .map(|c| c.f64())
            .collect::<PolarsResult<Vec<_>>>()?;

        let mut result = Self::new(schema);
        for i in 0..df.height() {
            let property_id = ids.get(i).ok_or_else(|| OutputError::InvalidValue {
                column: PROPERTY_ID_COLUMN.to_string(),
                reason: format!("missing id in row {i}"),
            })?;

            let statistics = numeric
                .chunks(2)
                .map(|pair| match (pair[0].get(i), pair[1].get(i)) {
                    (Some(alpha), Some(beta)) => Some(RiskStatistics { alpha, beta }),
                    _ => None,
                })
                .collect();

            if !result.push(PropertyRiskRow::new(property_id, statistics))? {
                tracing::warn!(property_id, "Duplicate property id in stored table, keeping first");
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_risk::FinancingScenario;

    fn stats(alpha: f64, beta: f64) -> Option<RiskStatistics> {
        Some(RiskStatistics { alpha, beta })
    }

    fn table(rows: &[(&str, Option<RiskStatistics>, Option<RiskStatistics>)]) -> AggregateResult {
        let mut result = AggregateResult::new(AggregateSchema::from_scenarios(&ScenarioSet::default()));
        for (id, levered, cash) in rows {
            result
                .push(PropertyRiskRow::new(*id, vec![*levered, *cash]))
                .unwrap();
        }
        result
    }

    #[test]
    fn test_schema_column_names() {
        let schema = AggregateSchema::from_scenarios(&ScenarioSet::default());
        assert_eq!(
            schema.column_names(),
            vec!["property_id", "5%_down_Alpha", "5%_down_Beta", "Alpha", "Beta"]
        );
        assert_eq!(schema.alpha_column(1), Some("Alpha"));
        assert_eq!(schema.beta_column(0), Some("5%_down_Beta"));
        assert_eq!(schema.alpha_column(2), None);
    }

    #[test]
    fn test_schema_uses_configured_labels() {
        let scenarios = ScenarioSet::new(vec![
            FinancingScenario::new(0.2, 0.07, 15).with_label("conventional"),
            FinancingScenario::all_cash().with_label("cash"),
        ])
        .unwrap();
        let schema = AggregateSchema::from_scenarios(&scenarios);
        assert_eq!(
            schema.numeric_columns(),
            vec!["conventional_Alpha", "conventional_Beta", "Alpha", "Beta"]
        );
    }

    #[test]
    fn test_check_columns() {
        let schema = AggregateSchema::from_scenarios(&ScenarioSet::default());
        assert!(schema.check_columns(&schema.column_names()).is_ok());
        assert!(matches!(
            schema.check_columns(&["property_id", "Alpha", "Beta"]),
            Err(OutputError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_push_never_replaces() {
        let mut result = table(&[("1", stats(0.1, 0.2), stats(0.0, 0.1))]);
        let added = result
            .push(PropertyRiskRow::new("1", vec![stats(0.9, 0.9), None]))
            .unwrap();
        assert!(!added);
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0].statistics[0], stats(0.1, 0.2));
    }

    #[test]
    fn test_push_rejects_wrong_width() {
        let mut result = table(&[]);
        assert!(result.push(PropertyRiskRow::new("1", vec![None])).is_err());
    }

    #[test]
    fn test_filter_outliers() {
        let mut result = table(&[
            ("1", stats(0.1, 0.2), stats(0.0, 0.1)),
            ("2", stats(1.5, 0.2), stats(0.0, 0.1)),
            ("3", None, stats(0.0, -1.01)),
            ("4", None, stats(1.0, -1.0)),
        ]);

        assert_eq!(result.filter_outliers(1.0), 2);
        assert_eq!(result.property_ids().collect::<Vec<_>>(), vec!["1", "4"]);
        assert!(!result.contains("2"));
        assert_eq!(result.filter_outliers(1.0), 0);
    }

    #[test]
    fn test_merge_appends_new_ids_only() {
        let mut existing = table(&[("1", stats(0.1, 0.2), None)]);
        let fresh = table(&[("1", stats(0.5, 0.5), None), ("2", None, stats(0.0, 0.3))]);

        assert_eq!(existing.merge(fresh).unwrap(), 1);
        assert_eq!(existing.property_ids().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(existing.rows()[0].statistics[0], stats(0.1, 0.2));
    }

    #[test]
    fn test_merge_rejects_other_schema() {
        let mut existing = table(&[]);
        let other = AggregateResult::new(AggregateSchema::from_scenarios(
            &ScenarioSet::new(vec![FinancingScenario::all_cash()]).unwrap(),
        ));
        assert!(matches!(
            existing.merge(other),
            Err(OutputError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_dataframe_round_trip() {
        let result = table(&[
            ("1", stats(0.1, 0.2), stats(0.0, 0.1)),
            ("2", None, stats(-0.3, 0.4)),
        ]);

        let df = result.to_dataframe().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 5);

        let back = AggregateResult::from_dataframe(&df, result.schema().clone()).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_from_dataframe_checks_schema() {
        let df = table(&[("1", stats(0.1, 0.2), None)]).to_dataframe().unwrap();
        let schema = AggregateSchema::from_scenarios(
            &ScenarioSet::new(vec![FinancingScenario::all_cash()]).unwrap(),
        );
        assert!(matches!(
            AggregateResult::from_dataframe(&df, schema),
            Err(OutputError::SchemaMismatch { .. })
        ));
    }
}
