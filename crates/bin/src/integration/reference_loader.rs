//! Loading the market and risk-free reference series for a run.
//!
//! A series configured with a CSV path is read from disk. Otherwise it is
//! served from the SQLite cache when the cache covers the requested window,
//! and fetched from Yahoo Finance (then cached) when it does not.

use super::cache_manager;
use chrono::{DateTime, NaiveDate, Utc};
use hearth::HearthConfig;
use hearth_data::cache::SqliteCache;
use hearth_data::yahoo::YahooQuoteProvider;
use hearth_data::{DataError, ReferenceSeries, load_series_csv};
use hearth_risk::{ReferenceSeriesCache, RiskError};
use std::path::Path;
use std::time::Duration;

/// Error type for reference loading.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ReferenceError {
    /// Fetch, cache or file error.
    #[error("Reference data error: {0}")]
    Data(#[from] DataError),
    /// Risk-free conversion error.
    #[error("Reference conversion error: {0}")]
    Risk(#[from] RiskError),
    /// The provider did not answer in time.
    #[error("Timed out after {secs}s fetching {ticker}")]
    Timeout {
        /// Ticker being fetched
        ticker: String,
        /// Configured timeout
        secs: u64,
    },
}

/// How the cache is used while resolving reference series.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FetchOptions {
    /// Whether to use the cache.
    pub use_cache: bool,
    /// Whether to force refresh (ignore cached points).
    pub force_refresh: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            force_refresh: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    timeout: Duration,
}

impl Window {
    fn from_config(config: &HearthConfig) -> Self {
        let start = config
            .fetch
            .start_date
            .and_hms_opt(0, 0, 0)
            .map_or_else(Utc::now, |dt| dt.and_utc());
        Self {
            start,
            end: Utc::now(),
            timeout: Duration::from_secs(config.fetch.timeout_secs),
        }
    }

    fn dates(&self) -> (NaiveDate, NaiveDate) {
        (self.start.date_naive(), self.end.date_naive())
    }
}

/// Build the reference cache for a batch run.
pub(crate) async fn load_reference_cache(
    config: &HearthConfig,
    options: FetchOptions,
) -> Result<ReferenceSeriesCache, ReferenceError> {
    let (market, risk_free) = resolve_pair(config, options).await?;
    tracing::info!(
        market = market.name(),
        market_points = market.len(),
        risk_free = risk_free.name(),
        risk_free_points = risk_free.len(),
        "Reference series loaded"
    );
    Ok(ReferenceSeriesCache::from_annualized_percent(
        market,
        &risk_free,
        config.benchmark.periods_per_year,
    )?)
}

/// Download both reference series and store them in the cache.
///
/// Returns the number of points fetched per series.
pub(crate) async fn refresh_cache(
    config: &HearthConfig,
    force_refresh: bool,
) -> Result<Vec<(String, usize)>, ReferenceError> {
    let options = FetchOptions {
        use_cache: true,
        force_refresh,
    };
    let (market, risk_free) = fetch_pair(config, options).await?;
    Ok(vec![
        (market.name().to_string(), market.len()),
        (risk_free.name().to_string(), risk_free.len()),
    ])
}

async fn resolve_pair(
    config: &HearthConfig,
    options: FetchOptions,
) -> Result<(ReferenceSeries, ReferenceSeries), ReferenceError> {
    let bench = &config.benchmark;
    let window = Window::from_config(config);
    let market = read_csv(config.paths.market_csv.as_deref(), &bench.market_ticker, &window)?;
    let risk_free = read_csv(
        config.paths.risk_free_csv.as_deref(),
        &bench.risk_free_ticker,
        &window,
    )?;

    match (market, risk_free) {
        (Some(market), Some(risk_free)) => Ok((market, risk_free)),
        (market, risk_free) => {
            let (fetched_market, fetched_risk_free) = fetch_pair(config, options).await?;
            Ok((
                market.unwrap_or(fetched_market),
                risk_free.unwrap_or(fetched_risk_free),
            ))
        }
    }
}

/// Read a configured CSV, keeping only points inside the fetch window.
fn read_csv(
    path: Option<&Path>,
    name: &str,
    window: &Window,
) -> Result<Option<ReferenceSeries>, DataError> {
    let (start, end) = window.dates();
    path.map(|path| {
        tracing::debug!(name, path = %path.display(), "Reading reference CSV");
        load_series_csv(path, name).map(|series| series.slice(start, end))
    })
    .transpose()
}

async fn fetch_pair(
    config: &HearthConfig,
    options: FetchOptions,
) -> Result<(ReferenceSeries, ReferenceSeries), ReferenceError> {
    let window = Window::from_config(config);
    let cache_override = config.paths.cache_db.as_deref();
    let cache = if options.use_cache {
        match cache_manager::open_cache(cache_override) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!(error = %e, "Cache unavailable, fetching without it");
                None
            }
        }
    } else {
        None
    };

    let market_ticker = config.benchmark.market_ticker.as_str();
    let risk_free_ticker = config.benchmark.risk_free_ticker.as_str();

    let mut cached = [None, None];
    if let Some(cache) = cache.as_ref().filter(|_| !options.force_refresh) {
        for (slot, ticker) in cached.iter_mut().zip([market_ticker, risk_free_ticker]) {
            *slot = cached_series(cache, ticker, &window);
        }
    }
    let [cached_market, cached_risk_free] = cached;

    let needs_provider = cached_market.is_none() || cached_risk_free.is_none();
    let provider = if needs_provider {
        Some(YahooQuoteProvider::new()?)
    } else {
        None
    };

    let (market, risk_free) = futures::try_join!(
        obtain(provider.as_ref(), cached_market, market_ticker, &window),
        obtain(provider.as_ref(), cached_risk_free, risk_free_ticker, &window),
    )?;

    if let Some(cache) = &cache {
        for (series, fresh) in [(&market.0, market.1), (&risk_free.0, risk_free.1)] {
            if !fresh {
                continue;
            }
            if let Err(e) = cache.put_series(series) {
                tracing::warn!(name = series.name(), error = %e, "Failed to cache series");
            }
        }
    }

    Ok((market.0, risk_free.0))
}

fn cached_series(cache: &SqliteCache, ticker: &str, window: &Window) -> Option<ReferenceSeries> {
    let (start, end) = window.dates();
    match cache.has_series(ticker, start, end) {
        Ok(true) => match cache.get_series(ticker, start, end) {
            Ok(series) => {
                tracing::debug!(ticker, points = series.len(), "Cache hit");
                Some(series)
            }
            Err(e) => {
                tracing::debug!(ticker, error = %e, "Cache read failed");
                None
            }
        },
        Ok(false) => None,
        Err(e) => {
            tracing::debug!(ticker, error = %e, "Cache lookup failed");
            None
        }
    }
}

/// A cached series as-is, or a fresh download flagged for caching.
async fn obtain(
    provider: Option<&YahooQuoteProvider>,
    cached: Option<ReferenceSeries>,
    ticker: &str,
    window: &Window,
) -> Result<(ReferenceSeries, bool), ReferenceError> {
    if let Some(series) = cached {
        return Ok((series, false));
    }
    let Some(provider) = provider else {
        return Err(DataError::MissingData {
            symbol: ticker.to_string(),
            reason: "no cached data and no provider".to_string(),
        }
        .into());
    };

    let fetch = provider.fetch_series(ticker, window.start, window.end);
    match tokio::time::timeout(window.timeout, fetch).await {
        Ok(series) => Ok((series?, true)),
        Err(_) => Err(ReferenceError::Timeout {
            ticker: ticker.to_string(),
            secs: window.timeout.as_secs(),
        }),
    }
}
