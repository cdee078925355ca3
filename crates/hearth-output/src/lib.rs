#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hearth-analytics/hearth/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod aggregate;
pub mod error;
pub mod export;
pub mod report;
pub mod store;
pub mod summary;

pub use aggregate::{AggregateResult, AggregateSchema, PROPERTY_ID_COLUMN, PropertyRiskRow};
pub use error::{OutputError, Result};
pub use export::{ExportFormat, Exporter};
pub use report::{BatchReport, SkipCounts};
pub use store::{AggregateStore, read_csv};
pub use summary::{ColumnSummary, DescriptiveSummary, describe};
