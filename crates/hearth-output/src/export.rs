//! CSV and JSON export.
//!
//! Everything the pipeline writes for people goes through [`Exporter`]:
//! the aggregate table, its descriptive summary and the batch report.

use crate::aggregate::{AggregateResult, PROPERTY_ID_COLUMN};
use crate::error::{OutputError, Result};
use crate::report::BatchReport;
use crate::summary::DescriptiveSummary;
use hearth_risk::SkipReason;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Ok(Self::Csv),
            Some("json") => Ok(Self::PrettyJson),
            other => Err(OutputError::InvalidFormat(format!(
                "unsupported export extension {other:?}"
            ))),
        }
    }
}

/// Trait for types that can be exported to various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<()> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn writer_into_string(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| OutputError::InvalidFormat(e.to_string()))
}

fn json<T: Serialize + ?Sized>(value: &T, format: ExportFormat) -> Result<String> {
    Ok(match format {
        ExportFormat::PrettyJson => serde_json::to_string_pretty(value)?,
        _ => serde_json::to_string(value)?,
    })
}

impl Exporter for AggregateResult {
    fn export_to_string(&self, format: ExportFormat) -> Result<String> {
        let columns = self.schema().column_names();

        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                wtr.write_record(&columns)?;
                for row in self.rows() {
                    let mut record = Vec::with_capacity(columns.len());
                    record.push(row.property_id.clone());
                    record.extend(row.values().map(|v| v.map(|v| v.to_string()).unwrap_or_default()));
                    wtr.write_record(&record)?;
                }
                writer_into_string(wtr)
            }
            ExportFormat::Json | ExportFormat::PrettyJson => {
                let records: Vec<Map<String, Value>> = self
                    .rows()
                    .iter()
                    .map(|row| {
                        let mut record = Map::new();
                        record.insert(
                            PROPERTY_ID_COLUMN.to_string(),
                            Value::String(row.property_id.clone()),
                        );
                        for (name, value) in columns[1..].iter().zip(row.values()) {
                            record.insert(name.clone(), value.map_or(Value::Null, Value::from));
                        }
                        record
                    })
                    .collect();
                json(&records, format)
            }
        }
    }
}

impl Exporter for DescriptiveSummary {
    fn export_to_string(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                for column in &self.columns {
                    wtr.serialize(column)?;
                }
                writer_into_string(wtr)
            }
            ExportFormat::Json | ExportFormat::PrettyJson => json(self, format),
        }
    }
}

#[derive(Serialize)]
struct CounterRecord<'a> {
    counter: &'a str,
    value: usize,
}

impl Exporter for BatchReport {
    fn export_to_string(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                for (counter, value) in [
                    ("processed", self.processed),
                    ("already_present", self.already_present),
                    ("computed", self.computed),
                    ("appended", self.appended),
                    ("total_rows", self.total_rows),
                ] {
                    wtr.serialize(CounterRecord { counter, value })?;
                }
                for reason in SkipReason::ALL {
                    let counter = format!("skipped_{}", reason.as_str());
                    wtr.serialize(CounterRecord {
                        counter: &counter,
                        value: self.skipped.get(reason),
                    })?;
                }
                writer_into_string(wtr)
            }
            ExportFormat::Json | ExportFormat::PrettyJson => json(self, format),
        }
    }
}
