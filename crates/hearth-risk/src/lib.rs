#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/hearth-analytics/hearth/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod align;
pub mod error;
pub mod estimate;
pub mod leverage;
pub mod rate;
pub mod reference;
pub mod scenario;

// Re-export main types
pub use align::{AlignedFrame, AlignedRow, AlignerConfig, TimeSeriesAligner};
pub use error::{Result, RiskError, SkipReason};
pub use estimate::{EstimatorConfig, RiskStatistics, RiskStatisticsEstimator};
pub use leverage::{LeveragedReturnBuilder, ScenarioReturns, monthly_mortgage_payment};
pub use rate::{DEFAULT_PERIODS_PER_YEAR, compound, deannualize};
pub use reference::ReferenceSeriesCache;
pub use scenario::{FinancingScenario, ScenarioSet};
