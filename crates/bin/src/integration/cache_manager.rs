//! Location and lifecycle of the reference-series cache.

use hearth_data::cache::{CacheStats, SqliteCache};
use hearth_data::{DataError, ReferenceSeries};
use std::path::{Path, PathBuf};

/// Platform cache directory for Hearth.
///
/// - Linux: `~/.cache/hearth/`
/// - macOS: `~/Library/Caches/hearth/`
/// - Windows: `%LOCALAPPDATA%\hearth\`
pub(crate) fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hearth")
}

/// Cache database path, preferring an explicit override from configuration.
pub(crate) fn cache_path(path_override: Option<&Path>) -> PathBuf {
    path_override.map_or_else(|| default_cache_dir().join("hearth.db"), Path::to_path_buf)
}

/// Open the cache, creating its directory if needed.
pub(crate) fn open_cache(path_override: Option<&Path>) -> Result<SqliteCache, DataError> {
    let path = cache_path(path_override);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    SqliteCache::new(&path)
}

/// Print the cache location and, when it can be opened, its contents.
pub(crate) fn print_cache_info(path_override: Option<&Path>) {
    println!("  Cache location: {}", cache_path(path_override).display());
    match open_cache(path_override).and_then(|cache| cache.get_stats()) {
        Ok(stats) => print_stats(&stats),
        Err(e) => tracing::debug!(error = %e, "Cache unavailable"),
    }
}

fn print_stats(stats: &CacheStats) {
    println!(
        "  Cached data: {} points across {} series",
        stats.total_points, stats.series_count
    );
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        println!("  Date range: {oldest} to {newest}");
    }
}

/// Remove one series from the cache, or everything when `name` is `None`.
pub(crate) fn clear(path_override: Option<&Path>, name: Option<&str>) -> Result<(), DataError> {
    let cache = open_cache(path_override)?;
    match name {
        Some(name) => cache.clear_series(name),
        None => cache.clear_all(),
    }
}

/// Every cached series in full, by name.
pub(crate) fn cached_series(path_override: Option<&Path>) -> Result<Vec<ReferenceSeries>, DataError> {
    let cache = open_cache(path_override)?;
    cache
        .series_names()?
        .iter()
        .map(|name| cache.get_full_series(name))
        .collect()
}
