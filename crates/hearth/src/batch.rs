//! Batch estimation across many properties.
//!
//! Each property runs through align → returns → estimate on its own. A
//! failure anywhere in that chain skips that property with a [`SkipReason`]
//! and the batch carries on; only unusable reference data or an unreadable
//! existing table abort a run.

use crate::error::Result;
use hearth_data::{DataError, PropertyRecord};
use hearth_output::{
    AggregateResult, AggregateSchema, BatchReport, DescriptiveSummary, OutputError,
    PropertyRiskRow, SkipCounts, describe,
};
use hearth_risk::{
    AlignerConfig, EstimatorConfig, LeveragedReturnBuilder, ReferenceSeriesCache, RiskError,
    RiskStatisticsEstimator, ScenarioSet, SkipReason, TimeSeriesAligner,
};
use rayon::prelude::*;
use std::collections::HashSet;

/// Records evaluated per parallel chunk.
const CHUNK_SIZE: usize = 512;

/// Settings for a batch run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Join and history-length settings
    pub aligner: AlignerConfig,
    /// Estimator settings
    pub estimator: EstimatorConfig,
    /// Rows with any `|alpha|` or `|beta|` above this are dropped
    pub outlier_threshold: f64,
    /// Worker threads; 1 runs sequentially
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            aligner: AlignerConfig::default(),
            estimator: EstimatorConfig::default(),
            outlier_threshold: 1.0,
            concurrency: 1,
        }
    }
}

/// Result of evaluating one property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyOutcome {
    /// At least one scenario produced statistics
    Computed {
        /// The aggregate row
        row: PropertyRiskRow,
        /// Reasons for scenarios left empty
        scenario_failures: Vec<SkipReason>,
    },
    /// No row for this property
    Skipped {
        /// Property identifier
        property_id: String,
        /// Why it was skipped
        reason: SkipReason,
    },
}

/// Everything a batch run produces.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Existing rows followed by the newly computed ones
    pub result: AggregateResult,
    /// Counters for the run
    pub report: BatchReport,
    /// Descriptive statistics of `result`
    pub summary: DescriptiveSummary,
}

/// Runs the estimation pipeline over a stream of property records.
#[derive(Debug, Clone)]
pub struct BatchAggregator {
    scenarios: ScenarioSet,
    schema: AggregateSchema,
    aligner: TimeSeriesAligner,
    builder: LeveragedReturnBuilder,
    estimator: RiskStatisticsEstimator,
    outlier_threshold: f64,
    concurrency: usize,
}

impl BatchAggregator {
    /// Create an aggregator for a validated scenario set.
    pub fn new(scenarios: ScenarioSet, config: BatchConfig) -> Self {
        Self {
            schema: AggregateSchema::from_scenarios(&scenarios),
            scenarios,
            aligner: TimeSeriesAligner::new(config.aligner),
            builder: LeveragedReturnBuilder::new(),
            estimator: RiskStatisticsEstimator::new(config.estimator),
            outlier_threshold: config.outlier_threshold,
            concurrency: config.concurrency.max(1),
        }
    }

    /// Output column layout.
    pub const fn schema(&self) -> &AggregateSchema {
        &self.schema
    }

    /// Financing scenarios, in column order.
    pub const fn scenarios(&self) -> &ScenarioSet {
        &self.scenarios
    }

    /// Evaluate a single property against the reference series.
    pub fn evaluate(&self, record: &PropertyRecord, cache: &ReferenceSeriesCache) -> PropertyOutcome {
        let property_id = record.property_id.clone();
        let skip = |reason: SkipReason, detail: &dyn std::fmt::Display| {
            tracing::debug!(property_id = %record.property_id, %reason, %detail, "Skipping property");
            PropertyOutcome::Skipped {
                property_id: record.property_id.clone(),
                reason,
            }
        };

        let points = match record.valuation_points() {
            Ok(points) => points,
            Err(e) => return skip(SkipReason::Malformed, &e),
        };

        let frame = match self.aligner.align_with_cache(&points, cache) {
            Ok(frame) => frame,
            Err(e) => return skip(e.skip_reason(), &e),
        };

        let returns = match self.builder.build_returns(&frame, &self.scenarios) {
            Ok(returns) => returns,
            Err(e) => return skip(e.skip_reason(), &e),
        };

        let mut statistics = Vec::with_capacity(returns.len());
        let mut scenario_failures = Vec::new();
        for scenario in &returns {
            tracing::trace!(
                property_id = %record.property_id,
                scenario = %scenario.label,
                periods = scenario.len(),
                mean_return = ?scenario.mean_asset_return(),
                "Scenario returns built"
            );
            match self.estimator.estimate_returns(scenario) {
                Ok(stats) => statistics.push(Some(stats)),
                Err(e @ RiskError::DegenerateVariance { .. }) => {
                    tracing::trace!(
                        property_id = %record.property_id,
                        scenario = %scenario.label,
                        error = %e,
                        "Scenario left empty"
                    );
                    scenario_failures.push(e.skip_reason());
                    statistics.push(None);
                }
                Err(e) => return skip(e.skip_reason(), &e),
            }
        }

        if statistics.iter().all(Option::is_none) {
            let reason = scenario_failures
                .first()
                .copied()
                .unwrap_or(SkipReason::DegenerateVariance);
            return skip(reason, &"no scenario could be estimated");
        }

        PropertyOutcome::Computed {
            row: PropertyRiskRow::new(property_id, statistics),
            scenario_failures,
        }
    }

    /// Run the pipeline over `properties`.
    ///
    /// Properties already in `existing` are never recomputed; new rows are
    /// outlier-filtered and appended after the existing ones.
    pub fn run<I>(
        &self,
        properties: I,
        cache: &ReferenceSeriesCache,
        existing: Option<AggregateResult>,
    ) -> Result<BatchOutcome>
    where
        I: IntoIterator<Item = hearth_data::Result<PropertyRecord>>,
    {
        self.run_with_progress(properties, cache, existing, |_| {})
    }

    /// Like [`Self::run`], calling `progress` with the number of records
    /// handled after each chunk.
    pub fn run_with_progress<I, F>(
        &self,
        properties: I,
        cache: &ReferenceSeriesCache,
        existing: Option<AggregateResult>,
        progress: F,
    ) -> Result<BatchOutcome>
    where
        I: IntoIterator<Item = hearth_data::Result<PropertyRecord>>,
        F: Fn(usize),
    {
        cache.ensure_loaded()?;

        let mut merged = match existing {
            Some(table) if table.schema() != &self.schema => {
                return Err(OutputError::SchemaMismatch {
                    expected: self.schema.column_names(),
                    found: table.schema().column_names(),
                }
                .into());
            }
            Some(table) => table,
            None => AggregateResult::new(self.schema.clone()),
        };

        let pool = self.thread_pool();
        let mut report = BatchReport::default();
        let mut fresh = AggregateResult::new(self.schema.clone());
        let mut seen: HashSet<String> = HashSet::new();
        let mut pending: Vec<PropertyRecord> = Vec::with_capacity(CHUNK_SIZE);

        tracing::info!(
            existing = merged.len(),
            scenarios = self.scenarios.len(),
            concurrency = self.concurrency,
            "Starting batch"
        );

        for item in properties {
            report.processed += 1;
            match item {
                Ok(record) => {
                    if merged.contains(&record.property_id) || !seen.insert(record.property_id.clone()) {
                        report.already_present += 1;
                        continue;
                    }
                    pending.push(record);
                }
                Err(e) => report.skipped.record(input_skip_reason(&e)),
            }

            if pending.len() >= CHUNK_SIZE {
                self.flush(&mut pending, cache, pool.as_ref(), &mut fresh, &mut report)?;
                progress(report.processed);
            }
        }
        self.flush(&mut pending, cache, pool.as_ref(), &mut fresh, &mut report)?;
        progress(report.processed);

        let outliers = fresh.filter_outliers(self.outlier_threshold);
        report.skipped.record_many(SkipReason::Outlier, outliers);

        report.appended = merged.merge(fresh)?;
        report.total_rows = merged.len();
        let summary = describe(&merged);

        tracing::info!(
            processed = report.processed,
            computed = report.computed,
            appended = report.appended,
            skipped = report.skipped.total(),
            outliers,
            "Batch complete"
        );

        Ok(BatchOutcome {
            result: merged,
            report,
            summary,
        })
    }

    fn thread_pool(&self) -> Option<rayon::ThreadPool> {
        if self.concurrency <= 1 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot build worker pool, running sequentially");
                None
            }
        }
    }

    fn flush(
        &self,
        pending: &mut Vec<PropertyRecord>,
        cache: &ReferenceSeriesCache,
        pool: Option<&rayon::ThreadPool>,
        fresh: &mut AggregateResult,
        report: &mut BatchReport,
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }

        let outcomes: Vec<PropertyOutcome> = match pool {
            Some(pool) => pool.install(|| {
                pending
                    .par_iter()
                    .map(|record| self.evaluate(record, cache))
                    .collect()
            }),
            None => pending.iter().map(|record| self.evaluate(record, cache)).collect(),
        };
        pending.clear();

        report.skipped.absorb(&skip_counts(&outcomes));
        for outcome in outcomes {
            if let PropertyOutcome::Computed {
                row,
                scenario_failures,
            } = outcome
            {
                report.computed += 1;
                for reason in scenario_failures {
                    report.scenario_failures.record(reason);
                }
                fresh.push(row)?;
            }
        }
        Ok(())
    }
}

fn input_skip_reason(error: &DataError) -> SkipReason {
    tracing::debug!(%error, "Skipping unreadable record");
    if error.is_missing_data() {
        SkipReason::MissingHistory
    } else {
        SkipReason::Malformed
    }
}

/// Tally of skip reasons in a set of outcomes.
fn skip_counts<'a>(outcomes: impl IntoIterator<Item = &'a PropertyOutcome>) -> SkipCounts {
    let mut counts = SkipCounts::default();
    for outcome in outcomes {
        if let PropertyOutcome::Skipped { reason, .. } = outcome {
            counts.record(*reason);
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate};
    use hearth_data::{RawTimestamp, RawValuationPoint, ReferenceSeries};
    use hearth_risk::FinancingScenario;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + Duration::days(n)
    }

    fn record(id: &str, history: &[(i64, f64)]) -> PropertyRecord {
        PropertyRecord::new(
            id.to_string(),
            history
                .iter()
                .map(|&(n, value)| RawValuationPoint {
                    date: RawTimestamp::Text(day(n).to_string()),
                    value: Some(value),
                })
                .collect(),
        )
    }

    /// Market moving a little every day, zero risk-free rate.
    fn moving_cache() -> ReferenceSeriesCache {
        ReferenceSeriesCache::new(
            ReferenceSeries::new(
                "SPY",
                (0..=120).map(|n| (day(n), 100.0 + (n % 7) as f64 + n as f64 * 0.05)),
            ),
            ReferenceSeries::new("^IRX", (0..=120).map(|n| (day(n), 0.0))),
        )
    }

    fn flat_cache() -> ReferenceSeriesCache {
        ReferenceSeriesCache::new(
            ReferenceSeries::new("SPY", (0..=120).map(|n| (day(n), 100.0))),
            ReferenceSeries::new("^IRX", (0..=120).map(|n| (day(n), 0.0))),
        )
    }

    fn example_record(id: &str) -> PropertyRecord {
        record(
            id,
            &[(0, 200_000.0), (30, 202_000.0), (60, 201_000.0), (90, 205_000.0)],
        )
    }

    #[test]
    fn test_flat_market_skips_property() {
        let aggregator = BatchAggregator::new(ScenarioSet::default(), BatchConfig::default());
        let outcome = aggregator.evaluate(&example_record("1"), &flat_cache());
        assert_eq!(
            outcome,
            PropertyOutcome::Skipped {
                property_id: "1".to_string(),
                reason: SkipReason::DegenerateVariance,
            }
        );
    }

    #[test]
    fn test_short_history_is_insufficient() {
        let aggregator = BatchAggregator::new(ScenarioSet::default(), BatchConfig::default());
        let outcome = aggregator.evaluate(
            &record("1", &[(0, 1.0), (30, 1.1), (60, 1.2)]),
            &moving_cache(),
        );
        assert!(matches!(
            outcome,
            PropertyOutcome::Skipped {
                reason: SkipReason::InsufficientData,
                ..
            }
        ));
    }

    #[test]
    fn test_computes_all_scenarios() {
        let aggregator = BatchAggregator::new(ScenarioSet::default(), BatchConfig::default());
        let outcome = aggregator.evaluate(&example_record("7"), &moving_cache());
        let PropertyOutcome::Computed {
            row,
            scenario_failures,
        } = outcome
        else {
            panic!("expected computed outcome, got {outcome:?}");
        };
        assert_eq!(row.property_id, "7");
        assert_eq!(row.statistics.len(), 2);
        assert!(row.statistics.iter().all(Option::is_some));
        assert!(scenario_failures.is_empty());
    }

    #[test]
    fn test_run_isolates_failures() {
        let aggregator = BatchAggregator::new(ScenarioSet::default(), BatchConfig::default());
        let inputs = vec![
            Ok(example_record("1")),
            Err(DataError::Parse("broken json".to_string())),
            Ok(record("2", &[(0, 1.0)])),
            Err(DataError::MissingData {
                symbol: "3".to_string(),
                reason: "no history".to_string(),
            }),
            Ok(example_record("4")),
            Ok(example_record("1")),
        ];

        let outcome = aggregator.run(inputs, &moving_cache(), None).unwrap();
        let report = &outcome.report;
        assert_eq!(report.processed, 6);
        assert_eq!(report.already_present, 1);
        assert_eq!(report.skipped.get(SkipReason::Malformed), 1);
        assert_eq!(report.skipped.get(SkipReason::MissingHistory), 1);
        assert_eq!(report.skipped.get(SkipReason::InsufficientData), 1);
        assert_eq!(
            report.computed,
            report.appended + report.skipped.get(SkipReason::Outlier)
        );
        assert_eq!(outcome.result.len(), report.total_rows);
        assert_eq!(outcome.summary.rows, outcome.result.len());
    }

    #[test]
    fn test_outliers_are_dropped() {
        // A tiny threshold turns every computed row into an outlier.
        let config = BatchConfig {
            outlier_threshold: 1e-9,
            ..Default::default()
        };
        let aggregator = BatchAggregator::new(ScenarioSet::default(), config);
        let outcome = aggregator
            .run(vec![Ok(example_record("1"))], &moving_cache(), None)
            .unwrap();
        assert_eq!(outcome.report.computed, 1);
        assert_eq!(outcome.report.skipped.get(SkipReason::Outlier), 1);
        assert!(outcome.result.is_empty());
    }

    #[test]
    fn test_empty_reference_aborts() {
        let aggregator = BatchAggregator::new(ScenarioSet::default(), BatchConfig::default());
        let cache = ReferenceSeriesCache::new(
            ReferenceSeries::new("SPY", Vec::new()),
            ReferenceSeries::new("^IRX", Vec::new()),
        );
        assert!(aggregator.run(vec![Ok(example_record("1"))], &cache, None).is_err());
    }

    #[test]
    fn test_rejects_existing_table_with_other_schema() {
        let aggregator = BatchAggregator::new(ScenarioSet::default(), BatchConfig::default());
        let other = ScenarioSet::new(vec![FinancingScenario::all_cash()]).unwrap();
        let existing = AggregateResult::new(AggregateSchema::from_scenarios(&other));
        let result = aggregator.run(Vec::new(), &moving_cache(), Some(existing));
        assert!(result.is_err());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let inputs = || {
            (0..40)
                .map(|i| {
                    Ok(record(
                        &format!("p{i}"),
                        &[
                            (0, 100_000.0),
                            (10 + i % 5, 101_000.0 + i as f64 * 10.0),
                            (40, 99_500.0),
                            (75, 103_000.0 - i as f64),
                        ],
                    ))
                })
                .collect::<Vec<_>>()
        };

        let sequential = BatchAggregator::new(ScenarioSet::default(), BatchConfig::default())
            .run(inputs(), &moving_cache(), None)
            .unwrap();
        let parallel = BatchAggregator::new(
            ScenarioSet::default(),
            BatchConfig {
                concurrency: 4,
                ..Default::default()
            },
        )
        .run(inputs(), &moving_cache(), None)
        .unwrap();

        assert_eq!(sequential.result, parallel.result);
        assert_eq!(sequential.report, parallel.report);
    }

    #[test]
    fn test_scenario_beta_against_own_market() {
        // A property whose value tracks the market exactly has all-cash beta 1.
        let cache = moving_cache();
        let history: Vec<(i64, f64)> = [0, 14, 31, 45, 59, 76, 90]
            .iter()
            .map(|&n| (n, cache.market().value_on(day(n)).unwrap() * 1_000.0))
            .collect();
        let scenarios = ScenarioSet::new(vec![FinancingScenario::all_cash()]).unwrap();
        let aggregator = BatchAggregator::new(scenarios, BatchConfig::default());

        let PropertyOutcome::Computed { row, .. } = aggregator.evaluate(&record("1", &history), &cache)
        else {
            panic!("expected computed outcome");
        };
        let stats = row.statistics[0].unwrap();
        assert_relative_eq!(stats.beta, 1.0, epsilon = 1e-12);
        assert_relative_eq!(stats.alpha, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_skip_counts() {
        let outcomes = [
            PropertyOutcome::Skipped {
                property_id: "1".into(),
                reason: SkipReason::Domain,
            },
            PropertyOutcome::Skipped {
                property_id: "2".into(),
                reason: SkipReason::Domain,
            },
        ];
        assert_eq!(skip_counts(&outcomes).get(SkipReason::Domain), 2);
    }
}
