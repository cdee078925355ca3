#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hearth-analytics/hearth/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod config;
pub mod error;

// Re-export main types from sub-crates
pub use hearth_data as data;
pub use hearth_output as output;
pub use hearth_risk as risk;

pub use batch::{BatchAggregator, BatchConfig, BatchOutcome, PropertyOutcome};
pub use config::{ConfigError, DEFAULT_CONFIG_FILE, HearthConfig};
pub use error::{HearthError, Result};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
