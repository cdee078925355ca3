//! SQLite caching layer for reference series.

use crate::error::{DataError, Result};
use crate::series::{ReferenceSeries, parse_date};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, params};
use std::path::Path;

/// SQLite cache for reference series.
#[derive(Debug)]
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    /// Create a new SQLite cache.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let cache = Self { conn };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.initialize_schema()?;
        Ok(cache)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS reference_series (
                name TEXT NOT NULL,
                date TEXT NOT NULL,
                value REAL NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (name, date)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reference_series_name_date
             ON reference_series(name, date)",
            [],
        )?;

        Ok(())
    }

    /// Check whether a series is cached densely enough over a date range.
    ///
    /// Business-day series cover roughly 252 of 365 calendar days, so the
    /// range counts as cached once 60% of its calendar days have a point.
    pub fn has_series(&self, name: &str, start: NaiveDate, end: NaiveDate) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM reference_series
             WHERE name = ?1 AND date >= ?2 AND date <= ?3",
            params![name, start.to_string(), end.to_string()],
            |row| row.get(0),
        )?;

        let days = (end - start).num_days().max(0);
        let expected_count = ((days as f64 * 0.6) as i64).max(1);

        Ok(count >= expected_count)
    }

    /// Get a cached series restricted to `[start, end]`.
    pub fn get_series(&self, name: &str, start: NaiveDate, end: NaiveDate) -> Result<ReferenceSeries> {
        let mut stmt = self.conn.prepare(
            "SELECT date, value FROM reference_series
             WHERE name = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC",
        )?;

        let rows = stmt.query_map(params![name, start.to_string(), end.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        Self::collect_series(name, rows)
    }

    /// Get every cached point of a series.
    pub fn get_full_series(&self, name: &str) -> Result<ReferenceSeries> {
        let mut stmt = self.conn.prepare(
            "SELECT date, value FROM reference_series WHERE name = ?1 ORDER BY date ASC",
        )?;

        let rows = stmt.query_map(params![name], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        Self::collect_series(name, rows)
    }

    fn collect_series(
        name: &str,
        rows: impl Iterator<Item = rusqlite::Result<(String, f64)>>,
    ) -> Result<ReferenceSeries> {
        let mut points = Vec::new();
        for row in rows {
            let (date, value) = row?;
            points.push((parse_date(&date)?, value));
        }

        if points.is_empty() {
            return Err(DataError::MissingData {
                symbol: name.to_string(),
                reason: "No cached data found".to_string(),
            });
        }

        Ok(ReferenceSeries::new(name, points))
    }

    /// Store a series in the cache, replacing points on the same dates.
    pub fn put_series(&self, series: &ReferenceSeries) -> Result<()> {
        let cached_at = Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;

        for (date, value) in series.points() {
            tx.execute(
                "INSERT OR REPLACE INTO reference_series (name, date, value, cached_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![series.name(), date.to_string(), value, cached_at],
            )?;
        }

        tx.commit()?;
        tracing::debug!(name = series.name(), points = series.len(), "Cached reference series");
        Ok(())
    }

    /// Names of all cached series.
    pub fn series_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT name FROM reference_series ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    /// Clear cached points for one series.
    pub fn clear_series(&self, name: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM reference_series WHERE name = ?1", params![name])?;
        Ok(())
    }

    /// Clear all cached data.
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM reference_series", [])?;
        Ok(())
    }

    /// Get cache statistics.
    pub fn get_stats(&self) -> Result<CacheStats> {
        let (total_points, series_count, oldest, newest): (i64, i64, Option<String>, Option<String>) =
            self.conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT name), MIN(date), MAX(date) FROM reference_series",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(CacheStats {
            total_points: total_points as usize,
            series_count: series_count as usize,
            oldest: oldest.as_deref().map(parse_date).transpose()?,
            newest: newest.as_deref().map(parse_date).transpose()?,
        })
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of cached points
    pub total_points: usize,
    /// Number of distinct series
    pub series_count: usize,
    /// Earliest cached date
    pub oldest: Option<NaiveDate>,
    /// Latest cached date
    pub newest: Option<NaiveDate>,
}
