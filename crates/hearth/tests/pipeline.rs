//! End-to-end tests: record files on disk through to a stored aggregate.

use chrono::{Duration, NaiveDate};
use hearth::data::{PropertyDirectory, ReferenceSeries};
use hearth::output::AggregateStore;
use hearth::risk::{ReferenceSeriesCache, ScenarioSet, SkipReason};
use hearth::{BatchAggregator, HearthConfig};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

fn day(n: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, 3, 1).unwrap() + Duration::days(n)
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("hearth_test_pipeline").join(name);
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Business-day market series with a weekly wiggle and a 5% T-bill yield.
fn cache() -> ReferenceSeriesCache {
    let business_days: Vec<i64> = (0..=400)
        .filter(|n| !matches!(day(*n).format("%a").to_string().as_str(), "Sat" | "Sun"))
        .collect();
    let market = ReferenceSeries::new(
        "O",
        business_days
            .iter()
            .map(|&n| (day(n), 60.0 + (n % 9) as f64 * 0.4 + n as f64 * 0.01)),
    );
    let irx = ReferenceSeries::new("^IRX", business_days.iter().map(|&n| (day(n), 5.0)));
    ReferenceSeriesCache::from_annualized_percent(market, &irx, 365).unwrap()
}

fn write_scraped(dir: &Path, zip: &str, zpid: u64, history: &[(i64, f64)]) {
    let zip_dir = dir.join(zip);
    fs::create_dir_all(&zip_dir).unwrap();
    let mut client_cache = serde_json::Map::new();
    client_cache.insert(
        format!("ForSaleQuery{{zpid:{zpid}}}"),
        json!({"property": {"zpid": zpid}}),
    );
    let doc = json!({
        "props": {"pageProps": {"componentProps": {"gdpClientCache": client_cache}}},
        "zestimateHistory": history
            .iter()
            .map(|&(n, price)| json!({"Date": day(n).to_string(), "Price": price}))
            .collect::<Vec<_>>(),
    });
    fs::write(
        zip_dir.join(format!("{zpid}_property_details.json")),
        doc.to_string(),
    )
    .unwrap();
}

fn monthly_history(start: f64, drift: f64) -> Vec<(i64, f64)> {
    (0..12)
        .map(|m| (m * 30, start * (1.0 + drift * m as f64 + 0.002 * (m % 3) as f64)))
        .collect()
}

#[test]
fn test_two_runs_merge_without_overwriting() {
    let root = scratch("merge");
    let records = root.join("PropertyDetails");
    let store = AggregateStore::new(root.join("stats.parquet"), Some(root.join("stats.csv")));

    write_scraped(&records, "02139", 1001, &monthly_history(400_000.0, 0.004));
    write_scraped(&records, "02139", 1002, &monthly_history(650_000.0, -0.001));
    write_scraped(&records, "30301", 2001, &[(0, 250_000.0), (30, 251_000.0)]);
    fs::write(records.join("30301").join("junk_property_details.json"), "{not json").unwrap();

    // Leverage easily pushes beta past 1; keep every row for this test.
    let mut config = HearthConfig::default();
    config.analysis.outlier_threshold = 1e6;
    let aggregator = BatchAggregator::new(config.scenario_set().unwrap(), config.batch_config());
    let cache = cache();

    // First run
    let existing = store.load(aggregator.schema()).unwrap();
    assert!(existing.is_none());
    let first = aggregator
        .run(PropertyDirectory::new(&records).records().unwrap(), &cache, existing)
        .unwrap();
    store.save(&first.result).unwrap();

    assert_eq!(first.report.processed, 4);
    assert_eq!(first.report.skipped.get(SkipReason::Malformed), 1);
    assert_eq!(first.report.skipped.get(SkipReason::InsufficientData), 1);
    let first_ids: Vec<String> = first.result.property_ids().map(str::to_string).collect();
    assert_eq!(first_ids, vec!["1001", "1002"]);

    // Second run sees one more property
    write_scraped(&records, "30301", 2002, &monthly_history(300_000.0, 0.002));
    let existing = store.load(aggregator.schema()).unwrap();
    let second = aggregator
        .run(PropertyDirectory::new(&records).records().unwrap(), &cache, existing)
        .unwrap();
    store.save(&second.result).unwrap();

    assert_eq!(second.report.already_present, first_ids.len());
    assert_eq!(second.report.appended, 1);
    let second_ids: Vec<String> = second.result.property_ids().map(str::to_string).collect();
    assert_eq!(&second_ids[..first_ids.len()], first_ids.as_slice());

    let mut unique = second_ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), second_ids.len());

    for row in first.result.rows() {
        let again = second
            .result
            .rows()
            .iter()
            .find(|r| r.property_id == row.property_id)
            .unwrap();
        assert_eq!(again, row);
    }

    // Third run over unchanged input appends nothing
    let existing = store.load(aggregator.schema()).unwrap();
    let third = aggregator
        .run(PropertyDirectory::new(&records).records().unwrap(), &cache, existing)
        .unwrap();
    assert_eq!(third.report.appended, 0);
    assert_eq!(third.result, second.result);
}

#[test]
fn test_flat_market_yields_no_rows() {
    let root = scratch("flat");
    let records = root.join("PropertyDetails");
    write_scraped(
        &records,
        "02139",
        7,
        &[(0, 200_000.0), (30, 202_000.0), (60, 201_000.0), (90, 205_000.0)],
    );

    let flat = ReferenceSeriesCache::new(
        ReferenceSeries::new("O", (0..=100).map(|n| (day(n), 50.0))),
        ReferenceSeries::new("^IRX", (0..=100).map(|n| (day(n), 0.0))),
    );
    let aggregator = BatchAggregator::new(ScenarioSet::default(), Default::default());
    let outcome = aggregator
        .run(PropertyDirectory::new(&records).records().unwrap(), &flat, None)
        .unwrap();

    assert!(outcome.result.is_empty());
    assert_eq!(outcome.report.skipped.get(SkipReason::DegenerateVariance), 1);
    assert_eq!(outcome.summary.columns.len(), 4);
    assert!(outcome.summary.columns.iter().all(|c| c.count == 0));
}
