#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hearth-analytics/hearth/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod error;
pub mod property;
pub mod series;
pub mod yahoo;

pub use error::{DataError, Result};
pub use property::{PropertyDirectory, PropertyRecord, RawTimestamp, RawValuationPoint};
pub use series::{ReferenceSeries, ValuationPoint, load_series_csv};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
