//! Reference series fetching from Yahoo Finance.

use crate::error::{DataError, Result};
use crate::series::ReferenceSeries;
use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;
use tokio::time::sleep;
use yahoo_finance_api as yahoo;

/// Yahoo Finance quote provider with rate limiting.
pub struct YahooQuoteProvider {
    provider: yahoo::YahooConnector,
    rate_limit_delay: Duration,
}

impl std::fmt::Debug for YahooQuoteProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YahooQuoteProvider")
            .field("rate_limit_delay", &self.rate_limit_delay)
            .finish_non_exhaustive()
    }
}

impl YahooQuoteProvider {
    /// Create a new provider with default rate limiting (1 req/sec).
    pub fn new() -> Result<Self> {
        Self::with_rate_limit(Duration::from_millis(1000))
    }

    /// Create a new provider with custom rate limiting.
    pub fn with_rate_limit(rate_limit_delay: Duration) -> Result<Self> {
        Ok(Self {
            provider: yahoo::YahooConnector::new()?,
            rate_limit_delay,
        })
    }

    /// Fetch the daily adjusted-close series for a ticker.
    ///
    /// # Arguments
    /// * `ticker` - The ticker symbol (e.g., "SPY", "^IRX")
    /// * `start` - Start of the requested window
    /// * `end` - End of the requested window
    ///
    /// # Returns
    /// A [`ReferenceSeries`] named after the ticker, one point per trading day.
    /// For rate tickers such as `^IRX` the values are annualised percentages.
    pub async fn fetch_series(
        &self,
        ticker: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ReferenceSeries> {
        if start > end {
            return Err(DataError::InvalidDateRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }

        if ticker.trim().is_empty() {
            return Err(DataError::InvalidSymbol("Empty symbol".to_string()));
        }

        let start_time = time::OffsetDateTime::from_unix_timestamp(start.timestamp())
            .map_err(|e| DataError::TimeConversion(e.to_string()))?;
        let end_time = time::OffsetDateTime::from_unix_timestamp(end.timestamp())
            .map_err(|e| DataError::TimeConversion(e.to_string()))?;

        tracing::debug!(ticker, %start, %end, "Requesting quote history");

        let response = self
            .provider
            .get_quote_history(ticker, start_time, end_time)
            .await?;

        let quotes = response
            .quotes()
            .map_err(|e| DataError::YahooApi(e.to_string()))?;

        if quotes.is_empty() {
            return Err(DataError::MissingData {
                symbol: ticker.to_string(),
                reason: "No data returned from Yahoo Finance".to_string(),
            });
        }

        let mut points = Vec::with_capacity(quotes.len());
        for quote in &quotes {
            points.push((quote_date(quote.timestamp)?, quote.adjclose));
        }

        sleep(self.rate_limit_delay).await;

        let series = ReferenceSeries::new(ticker, points);
        tracing::info!(ticker, points = series.len(), "Fetched reference series");
        Ok(series)
    }
}

/// Trading date of a quote's unix timestamp (seconds, UTC).
fn quote_date(timestamp: i64) -> Result<NaiveDate> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| DataError::TimeConversion(format!("bad timestamp {timestamp}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_fetch_series() {
        let provider = YahooQuoteProvider::new().unwrap();
        let end = Utc::now();
        let start = end - ChronoDuration::days(30);

        let series = provider.fetch_series("SPY", start, end).await.unwrap();
        assert!(!series.is_empty());
        assert_eq!(series.name(), "SPY");
    }

    #[test]
    fn test_quote_date() {
        // 2024-01-02 14:30:00 UTC, a regular-session open
        assert_eq!(
            quote_date(1_704_205_800).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert!(matches!(
            quote_date(i64::MAX),
            Err(DataError::TimeConversion(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_date_range() {
        let provider = YahooQuoteProvider::with_rate_limit(Duration::ZERO).unwrap();
        let start = Utc::now();
        let end = start - ChronoDuration::days(30);

        let result = provider.fetch_series("SPY", start, end).await;
        assert!(matches!(result, Err(DataError::InvalidDateRange { .. })));
    }

    #[tokio::test]
    async fn test_invalid_symbol() {
        let provider = YahooQuoteProvider::with_rate_limit(Duration::ZERO).unwrap();
        let end = Utc::now();
        let start = end - ChronoDuration::days(30);

        let result = provider.fetch_series("", start, end).await;
        assert!(matches!(result, Err(DataError::InvalidSymbol(_))));
    }
}
