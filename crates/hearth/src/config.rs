//! Run configuration.
//!
//! Loaded from a TOML file (`hearth.toml` by default), then overridden from
//! `HEARTH_*` environment variables, then validated. Every tunable of the
//! pipeline lives here: the benchmark tickers, the financing scenarios, the
//! outlier threshold and the minimum history length.

use crate::batch::BatchConfig;
use chrono::NaiveDate;
use hearth_risk::{
    AlignerConfig, DEFAULT_PERIODS_PER_YEAR, EstimatorConfig, FinancingScenario, RiskError,
    ScenarioSet,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "hearth.toml";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Cannot read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// One or more values are out of range
    #[error("Validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The scenario list is invalid
    #[error("Invalid scenarios: {0}")]
    Scenario(#[from] RiskError),
}

/// Market benchmark and risk-free reference.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Ticker of the market index (default: `O`, Realty Income)
    pub market_ticker: String,
    /// Ticker of the annualised risk-free yield, quoted in percent
    pub risk_free_ticker: String,
    /// Compounding periods per year for the risk-free conversion
    pub periods_per_year: u32,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            market_ticker: "O".to_string(),
            risk_free_ticker: "^IRX".to_string(),
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
        }
    }
}

/// Estimation and filtering policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Histories with this many points or fewer are skipped
    pub min_history_points: usize,
    /// Rows with any `|alpha|` or `|beta|` above this are dropped
    pub outlier_threshold: f64,
    /// Largest valuation-to-reference date gap accepted by the join
    pub max_join_gap_days: i64,
    /// Worker threads; 1 runs sequentially
    pub concurrency: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_history_points: 3,
            outlier_threshold: 1.0,
            max_join_gap_days: 10,
            concurrency: 1,
        }
    }
}

/// File locations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the scraped property records
    pub property_dir: PathBuf,
    /// Aggregate table, Parquet
    pub output_parquet: PathBuf,
    /// Aggregate table, CSV copy
    pub output_csv: Option<PathBuf>,
    /// Market series CSV to use instead of fetching
    pub market_csv: Option<PathBuf>,
    /// Risk-free series CSV (annualised percent) to use instead of fetching
    pub risk_free_csv: Option<PathBuf>,
    /// SQLite cache of fetched series; platform cache dir if unset
    pub cache_db: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            property_dir: PathBuf::from("data/property_details"),
            output_parquet: PathBuf::from("data/alpha_beta_stats.parquet"),
            output_csv: Some(PathBuf::from("data/alpha_beta_stats.csv")),
            market_csv: None,
            risk_free_csv: None,
            cache_db: None,
        }
    }
}

/// Reference data download window.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// First date requested from the quote provider
    pub start_date: NaiveDate,
    /// Timeout for the whole reference download
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            timeout_secs: 60,
        }
    }
}

fn default_scenarios() -> Vec<FinancingScenario> {
    ScenarioSet::default().scenarios().to_vec()
}

/// Complete run configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HearthConfig {
    /// Benchmark tickers
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    /// Estimation policy
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Financing scenarios, in output column order
    #[serde(default = "default_scenarios")]
    pub scenarios: Vec<FinancingScenario>,
    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,
    /// Download window
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl Default for HearthConfig {
    fn default() -> Self {
        Self {
            benchmark: BenchmarkConfig::default(),
            analysis: AnalysisConfig::default(),
            scenarios: default_scenarios(),
            paths: PathsConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl HearthConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.paths.normalize();
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load, apply environment overrides and validate.
    pub fn load_with_env_and_validate(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load_or_default(path)?.with_env_override();
        config.validate()?;
        Ok(config)
    }

    /// Apply `HEARTH_*` environment variables.
    pub fn with_env_override(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Recognised keys: `HEARTH_MARKET_TICKER`, `HEARTH_RISK_FREE_TICKER`,
    /// `HEARTH_PROPERTY_DIR`, `HEARTH_OUTPUT_PARQUET`, `HEARTH_OUTPUT_CSV`,
    /// `HEARTH_CACHE_DB`, `HEARTH_MIN_HISTORY_POINTS`,
    /// `HEARTH_MAX_JOIN_GAP_DAYS`, `HEARTH_OUTLIER_THRESHOLD`,
    /// `HEARTH_CONCURRENCY`. Unparseable numbers are ignored with a warning.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("HEARTH_MARKET_TICKER") {
            self.benchmark.market_ticker = v;
        }
        if let Some(v) = lookup("HEARTH_RISK_FREE_TICKER") {
            self.benchmark.risk_free_ticker = v;
        }
        if let Some(v) = lookup("HEARTH_PROPERTY_DIR") {
            self.paths.property_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("HEARTH_OUTPUT_PARQUET") {
            self.paths.output_parquet = PathBuf::from(v);
        }
        if let Some(v) = lookup("HEARTH_OUTPUT_CSV") {
            self.paths.output_csv = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("HEARTH_CACHE_DB") {
            self.paths.cache_db = Some(PathBuf::from(v));
        }
        override_parsed(&lookup, "HEARTH_MIN_HISTORY_POINTS", &mut self.analysis.min_history_points);
        override_parsed(&lookup, "HEARTH_MAX_JOIN_GAP_DAYS", &mut self.analysis.max_join_gap_days);
        override_parsed(&lookup, "HEARTH_OUTLIER_THRESHOLD", &mut self.analysis.outlier_threshold);
        override_parsed(&lookup, "HEARTH_CONCURRENCY", &mut self.analysis.concurrency);

        self.paths.normalize();
        self
    }

    /// Check every value, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.benchmark.market_ticker.trim().is_empty() {
            errors.push("benchmark.market_ticker cannot be empty".to_string());
        }
        if self.benchmark.risk_free_ticker.trim().is_empty() {
            errors.push("benchmark.risk_free_ticker cannot be empty".to_string());
        }
        if self.benchmark.periods_per_year == 0 {
            errors.push("benchmark.periods_per_year must be greater than 0".to_string());
        }

        let threshold = self.analysis.outlier_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            errors.push(format!(
                "analysis.outlier_threshold must be positive, got {threshold}"
            ));
        }
        if self.analysis.max_join_gap_days < 0 {
            errors.push("analysis.max_join_gap_days cannot be negative".to_string());
        }
        if self.analysis.concurrency == 0 {
            errors.push("analysis.concurrency must be at least 1".to_string());
        }

        if self.paths.output_parquet.as_os_str().is_empty() {
            errors.push("paths.output_parquet cannot be empty".to_string());
        }
        if self.fetch.timeout_secs == 0 {
            errors.push("fetch.timeout_secs must be greater than 0".to_string());
        }

        if let Err(e) = ScenarioSet::new(self.scenarios.clone()) {
            errors.push(format!("scenarios: {e}"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// The validated scenario set.
    pub fn scenario_set(&self) -> Result<ScenarioSet, ConfigError> {
        Ok(ScenarioSet::new(self.scenarios.clone())?)
    }

    /// Settings for the batch aggregator.
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            aligner: AlignerConfig {
                min_history_points: self.analysis.min_history_points,
                max_join_gap_days: self.analysis.max_join_gap_days,
            },
            estimator: EstimatorConfig::default(),
            outlier_threshold: self.analysis.outlier_threshold,
            concurrency: self.analysis.concurrency,
        }
    }
}

impl PathsConfig {
    /// Treat empty optional paths as unset.
    fn normalize(&mut self) {
        for path in [
            &mut self.output_csv,
            &mut self.market_csv,
            &mut self.risk_free_csv,
            &mut self.cache_db,
        ] {
            if path.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                *path = None;
            }
        }
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparseable override"),
        }
    }
}
