//! Caching layer for reference series.

pub mod sqlite;

pub use sqlite::{CacheStats, SqliteCache};
