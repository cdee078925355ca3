//! Per-property valuation records.
//!
//! Records come from the scraping layer as JSON documents. Two layouts are
//! understood: a flat one (`property_id` + `valuation_history`) and the raw
//! scraped page, where the history sits at the top level under
//! `zestimateHistory` and the property id is nested inside the page props.

use crate::error::{DataError, Result};
use crate::series::{ValuationPoint, parse_date};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// A timestamp as it appears in a raw record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// Epoch milliseconds (chart points).
    EpochMillis(i64),
    /// Epoch milliseconds serialised as a float.
    FractionalMillis(f64),
    /// Textual date or datetime.
    Text(String),
}

impl RawTimestamp {
    /// Calendar date of the timestamp (UTC for epoch values).
    pub fn to_date(&self) -> Result<chrono::NaiveDate> {
        match self {
            Self::EpochMillis(ms) => millis_to_date(*ms),
            Self::FractionalMillis(ms) => millis_to_date(ms.trunc() as i64),
            Self::Text(text) => parse_date(text),
        }
    }
}

fn millis_to_date(ms: i64) -> Result<chrono::NaiveDate> {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| DataError::TimeConversion(format!("epoch millis out of range: {ms}")))
}

/// One raw valuation entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawValuationPoint {
    /// When the valuation was recorded.
    #[serde(alias = "Date", alias = "x")]
    pub date: RawTimestamp,
    /// Valuation; scraped charts occasionally carry `null`.
    #[serde(alias = "Price", alias = "y")]
    pub value: Option<f64>,
}

/// A property identifier with its raw valuation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Property identifier (numeric ids are stringified).
    pub property_id: String,
    /// Valuation history in source order.
    pub valuation_history: Vec<RawValuationPoint>,
}

impl PropertyRecord {
    /// Create a record from already-parsed parts.
    pub const fn new(property_id: String, valuation_history: Vec<RawValuationPoint>) -> Self {
        Self {
            property_id,
            valuation_history,
        }
    }

    /// Build a record from a parsed JSON document.
    pub fn from_json_value(doc: &Value) -> Result<Self> {
        let property_id = find_property_id(doc).ok_or_else(|| {
            DataError::Parse("record carries no property id".to_string())
        })?;

        let history = doc
            .get("valuation_history")
            .or_else(|| doc.get("zestimateHistory"))
            .ok_or_else(|| DataError::MissingData {
                symbol: property_id.clone(),
                reason: "no valuation history".to_string(),
            })?;

        let valuation_history: Vec<RawValuationPoint> = serde_json::from_value(history.clone())?;

        Ok(Self {
            property_id,
            valuation_history,
        })
    }

    /// Parse a record from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(text)?;
        Self::from_json_value(&doc)
    }

    /// Read and parse a record file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Number of raw history entries.
    pub const fn history_len(&self) -> usize {
        self.valuation_history.len()
    }

    /// Convert the raw history into dated valuation points.
    ///
    /// Entries with a `null` value are dropped; an unparseable date fails
    /// the whole record.
    pub fn valuation_points(&self) -> Result<Vec<ValuationPoint>> {
        self.valuation_history
            .iter()
            .filter_map(|raw| raw.value.map(|value| (raw, value)))
            .map(|(raw, value)| Ok(ValuationPoint::new(raw.date.to_date()?, value)))
            .collect()
    }
}

fn id_from_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn find_property_id(doc: &Value) -> Option<String> {
    if let Some(id) = ["property_id", "zpid"]
        .iter()
        .find_map(|key| doc.get(key).and_then(id_from_value))
    {
        return Some(id);
    }

    let component_props = doc.pointer("/props/pageProps/componentProps")?;
    let cache = component_props
        .get("gdp")
        .or_else(|| component_props.get("gdpClientCache"))?;

    // The client cache is sometimes embedded as a JSON string.
    let cache = match cache {
        Value::String(text) => serde_json::from_str::<Value>(text).ok()?,
        other => other.clone(),
    };

    let first = cache.as_object()?.values().next()?;
    first.get("property")?.get("zpid").and_then(id_from_value)
}

/// A scrape output tree of property record files.
///
/// Files are discovered at the root and one directory level down (the
/// scraper groups records by zip code), keeping every `*.json` file.
#[derive(Debug, Clone)]
pub struct PropertyDirectory {
    root: PathBuf,
}

impl PropertyDirectory {
    /// Create a directory source rooted at `root`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All record paths in sorted order.
    pub fn paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                for inner in fs::read_dir(&path)? {
                    let inner = inner?.path();
                    if is_json(&inner) {
                        paths.push(inner);
                    }
                }
            } else if is_json(&path) {
                paths.push(path);
            }
        }

        paths.sort();
        Ok(paths)
    }

    /// Lazily parse every record file.
    ///
    /// Each item is parsed independently so one unreadable file only
    /// affects its own item.
    pub fn records(&self) -> Result<impl Iterator<Item = Result<PropertyRecord>> + use<>> {
        let paths = self.paths()?;
        tracing::info!(root = %self.root.display(), files = paths.len(), "Discovered property records");
        Ok(paths.into_iter().map(PropertyRecord::from_path))
    }
}

fn is_json(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
