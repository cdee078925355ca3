//! Financing scenarios.
//!
//! Scenarios are configuration: a short, fixed list validated once into a
//! [`ScenarioSet`] before any property is processed. Labels are resolved at
//! that point so output column names never change mid-run.

use crate::error::{Result, RiskError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Mortgage APR assumed by the default scenarios.
pub const DEFAULT_ANNUAL_MORTGAGE_RATE: f64 = 0.06281;

/// Loan term assumed by the default scenarios.
pub const DEFAULT_TERM_YEARS: u32 = 30;

/// Label given to the all-cash scenario when none is configured.
pub const ALL_CASH_LABEL: &str = "all_cash";

/// How a purchase is financed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancingScenario {
    /// Optional explicit label; derived from the down payment otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Fraction of the purchase price paid up front, in `(0, 1]`.
    pub down_payment_fraction: f64,
    /// Annual mortgage rate as a fraction (`0.06281` for 6.281%).
    #[serde(default = "default_annual_mortgage_rate")]
    pub annual_mortgage_rate: f64,
    /// Loan term in years.
    #[serde(default = "default_term_years")]
    pub term_years: u32,
}

const fn default_annual_mortgage_rate() -> f64 {
    DEFAULT_ANNUAL_MORTGAGE_RATE
}

const fn default_term_years() -> u32 {
    DEFAULT_TERM_YEARS
}

impl FinancingScenario {
    /// Create an unlabeled scenario.
    pub const fn new(down_payment_fraction: f64, annual_mortgage_rate: f64, term_years: u32) -> Self {
        Self {
            label: None,
            down_payment_fraction,
            annual_mortgage_rate,
            term_years,
        }
    }

    /// An all-cash purchase.
    pub const fn all_cash() -> Self {
        Self::new(1.0, DEFAULT_ANNUAL_MORTGAGE_RATE, DEFAULT_TERM_YEARS)
    }

    /// Set an explicit label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Whether the purchase carries no loan.
    pub fn is_all_cash(&self) -> bool {
        self.down_payment_fraction >= 1.0
    }

    /// The configured label, or one derived from the down payment
    /// (`5%_down`, `all_cash`).
    pub fn resolved_label(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        if self.is_all_cash() {
            return ALL_CASH_LABEL.to_string();
        }

        let pct = self.down_payment_fraction * 100.0;
        if (pct - pct.round()).abs() < 1e-9 {
            format!("{}%_down", pct.round() as i64)
        } else {
            format!("{pct:.2}%_down")
        }
    }

    /// Check the scenario parameters.
    pub fn validate(&self) -> Result<()> {
        let fraction = self.down_payment_fraction;
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(RiskError::Domain(format!(
                "down payment fraction must be in (0, 1], got {fraction}"
            )));
        }
        if !self.annual_mortgage_rate.is_finite() || self.annual_mortgage_rate <= -1.0 {
            return Err(RiskError::Domain(format!(
                "invalid annual mortgage rate {}",
                self.annual_mortgage_rate
            )));
        }
        if self.term_years == 0 {
            return Err(RiskError::Domain("loan term must be at least one year".into()));
        }
        if matches!(&self.label, Some(label) if label.trim().is_empty()) {
            return Err(RiskError::Domain("scenario label must not be blank".into()));
        }
        Ok(())
    }
}

/// A validated, ordered list of financing scenarios with resolved labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSet {
    scenarios: Vec<FinancingScenario>,
    labels: Vec<String>,
}

impl ScenarioSet {
    /// Validate scenarios and resolve their labels.
    ///
    /// Fails if the list is empty, any scenario is invalid, two scenarios
    /// share a label, or more than one scenario is all-cash (the all-cash
    /// scenario owns the unsuffixed output columns).
    pub fn new(scenarios: Vec<FinancingScenario>) -> Result<Self> {
        if scenarios.is_empty() {
            return Err(RiskError::Domain("at least one scenario is required".into()));
        }

        let mut seen = HashSet::new();
        let mut labels = Vec::with_capacity(scenarios.len());
        for scenario in &scenarios {
            scenario.validate()?;
            let label = scenario.resolved_label();
            if !seen.insert(label.clone()) {
                return Err(RiskError::Domain(format!("duplicate scenario label {label:?}")));
            }
            labels.push(label);
        }

        if scenarios.iter().filter(|s| s.is_all_cash()).count() > 1 {
            return Err(RiskError::Domain(
                "only one all-cash scenario may be configured".into(),
            ));
        }

        Ok(Self { scenarios, labels })
    }

    /// Scenarios in configured order.
    pub fn scenarios(&self) -> &[FinancingScenario] {
        &self.scenarios
    }

    /// Resolved labels in configured order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// `(label, scenario)` pairs in configured order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FinancingScenario)> {
        self.labels.iter().map(String::as_str).zip(&self.scenarios)
    }

    /// Number of scenarios.
    pub const fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Always false; a set holds at least one scenario.
    pub const fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Position of a label.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}

impl Default for ScenarioSet {
    /// 5% down at the default APR, and all-cash.
    fn default() -> Self {
        let scenarios = vec![
            FinancingScenario::new(0.05, DEFAULT_ANNUAL_MORTGAGE_RATE, DEFAULT_TERM_YEARS),
            FinancingScenario::all_cash(),
        ];
        Self {
            labels: scenarios.iter().map(FinancingScenario::resolved_label).collect(),
            scenarios,
        }
    }
}
