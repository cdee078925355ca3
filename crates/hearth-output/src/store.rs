//! Persistence of the aggregate table.
//!
//! The Parquet file is the source of truth for incremental runs; the CSV
//! copy is for people. Loading prefers Parquet and falls back to CSV so a
//! table produced by an older CSV-only run can still be extended.

use crate::aggregate::{AggregateResult, AggregateSchema, PropertyRiskRow};
use crate::error::{OutputError, Result};
use crate::export::{ExportFormat, Exporter};
use hearth_risk::RiskStatistics;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Parquet and CSV locations of the aggregate table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateStore {
    parquet_path: PathBuf,
    csv_path: Option<PathBuf>,
}

impl AggregateStore {
    /// Store at `parquet_path`, with an optional CSV copy.
    pub fn new(parquet_path: impl Into<PathBuf>, csv_path: Option<PathBuf>) -> Self {
        Self {
            parquet_path: parquet_path.into(),
            csv_path,
        }
    }

    /// Parquet location.
    pub fn parquet_path(&self) -> &Path {
        &self.parquet_path
    }

    /// CSV location, if any.
    pub fn csv_path(&self) -> Option<&Path> {
        self.csv_path.as_deref()
    }

    /// Load a previously saved table, or `None` if nothing was saved yet.
    pub fn load(&self, schema: &AggregateSchema) -> Result<Option<AggregateResult>> {
        if self.parquet_path.exists() {
            let file = File::open(&self.parquet_path)?;
            let df = ParquetReader::new(file).finish()?;
            let result = AggregateResult::from_dataframe(&df, schema.clone())?;
            tracing::info!(
                path = %self.parquet_path.display(),
                rows = result.len(),
                "Loaded existing aggregate"
            );
            return Ok(Some(result));
        }

        match &self.csv_path {
            Some(path) if path.exists() => {
                let result = read_csv(path, schema)?;
                tracing::info!(path = %path.display(), rows = result.len(), "Loaded existing aggregate");
                Ok(Some(result))
            }
            _ => Ok(None),
        }
    }

    /// Write the table to Parquet, and to CSV if configured.
    pub fn save(&self, result: &AggregateResult) -> Result<()> {
        ensure_parent(&self.parquet_path)?;
        let mut df = result.to_dataframe()?;
        let file = File::create(&self.parquet_path)?;
        ParquetWriter::new(file).finish(&mut df)?;

        if let Some(path) = &self.csv_path {
            ensure_parent(path)?;
            result.export_to_file(path, ExportFormat::Csv)?;
        }

        tracing::info!(
            path = %self.parquet_path.display(),
            rows = result.len(),
            "Saved aggregate"
        );
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(std::fs::create_dir_all(dir)?),
        _ => Ok(()),
    }
}

/// Read a table written by the CSV exporter.
pub fn read_csv(path: &Path, schema: &AggregateSchema) -> Result<AggregateResult> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    schema.check_columns(&headers)?;

    let numeric = schema.numeric_columns();
    let mut result = AggregateResult::new(schema.clone());

    for record in reader.records() {
        let record = record?;
        let property_id = record.get(0).unwrap_or_default().to_string();

        let mut values = Vec::with_capacity(numeric.len());
        for (offset, column) in numeric.iter().enumerate() {
            let field = record.get(offset + 1).unwrap_or_default().trim();
            let value = if field.is_empty() {
                None
            } else {
                Some(field.parse::<f64>().map_err(|e| OutputError::InvalidValue {
                    column: (*column).to_string(),
                    reason: format!("{field:?}: {e}"),
                })?)
            };
            values.push(value);
        }

        let statistics = values
            .chunks(2)
            .map(|pair| match (pair[0], pair[1]) {
                (Some(alpha), Some(beta)) => Some(RiskStatistics { alpha, beta }),
                _ => None,
            })
            .collect();
        result.push(PropertyRiskRow::new(property_id, statistics))?;
    }

    Ok(result)
}
