//! Batch run report.
//!
//! Counts of processed, computed and skipped properties, so a drop in data
//! quality shows up as a number rather than as a silently shorter table.

use hearth_risk::SkipReason;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const TABLE_WIDTH: usize = 60;

/// Skipped-property counters by reason.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkipCounts {
    counts: BTreeMap<SkipReason, usize>,
}

impl SkipCounts {
    /// Count one skipped property.
    pub fn record(&mut self, reason: SkipReason) {
        *self.counts.entry(reason).or_default() += 1;
    }

    /// Count `n` skipped properties.
    pub fn record_many(&mut self, reason: SkipReason, n: usize) {
        if n > 0 {
            *self.counts.entry(reason).or_default() += n;
        }
    }

    /// Number of properties skipped for `reason`.
    pub fn get(&self, reason: SkipReason) -> usize {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    /// Total skipped properties.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Add another set of counters into this one.
    pub fn absorb(&mut self, other: &Self) {
        for (reason, n) in &other.counts {
            self.record_many(*reason, *n);
        }
    }

    /// Non-zero counters in reporting order.
    pub fn iter(&self) -> impl Iterator<Item = (SkipReason, usize)> + '_ {
        self.counts.iter().map(|(r, n)| (*r, *n))
    }
}

/// Outcome counters of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Records pulled from the input
    pub processed: usize,
    /// Records skipped because their id was already in the stored table
    pub already_present: usize,
    /// Properties with at least one scenario estimated
    pub computed: usize,
    /// New rows appended to the table after outlier filtering
    pub appended: usize,
    /// Rows in the merged table
    pub total_rows: usize,
    /// Skipped properties by reason
    pub skipped: SkipCounts,
    /// Scenarios left empty because estimation failed, by reason
    pub scenario_failures: SkipCounts,
}

impl BatchReport {
    /// Format as ASCII table for terminal display.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str("\nBatch Report\n");
        output.push_str(&"=".repeat(TABLE_WIDTH));
        output.push('\n');
        for (label, value) in [
            ("Processed", self.processed),
            ("Already present", self.already_present),
            ("Computed", self.computed),
            ("Appended", self.appended),
            ("Total rows", self.total_rows),
        ] {
            output.push_str(&format!("  {label:<28} {value:>12}\n"));
        }

        output.push_str("\nSkipped:\n");
        output.push_str(&"-".repeat(TABLE_WIDTH));
        output.push('\n');
        for reason in SkipReason::ALL {
            output.push_str(&format!(
                "  {:<28} {:>12}\n",
                reason.as_str(),
                self.skipped.get(reason)
            ));
        }
        output.push_str(&format!("  {:<28} {:>12}\n", "total", self.skipped.total()));

        if self.scenario_failures.total() > 0 {
            output.push_str("\nEmpty scenarios:\n");
            output.push_str(&"-".repeat(TABLE_WIDTH));
            output.push('\n');
            for (reason, n) in self.scenario_failures.iter() {
                output.push_str(&format!("  {:<28} {:>12}\n", reason.as_str(), n));
            }
        }

        output.push_str(&"=".repeat(TABLE_WIDTH));
        output.push('\n');
        output
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} computed={} appended={} skipped={} total_rows={}",
            self.processed,
            self.computed,
            self.appended,
            self.skipped.total(),
            self.total_rows
        )
    }
}
