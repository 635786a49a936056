//! The consolidated run report.

use serde::{Deserialize, Serialize};

use super::Outcome;

/// Consolidated result of one dispatch run.
///
/// Assembled once, after every outcome is known or the run was cut short
/// by cancellation, and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Storage location (bucket) the run listed.
    pub location: String,
    /// Key prefix the listing was filtered by.
    pub filter: String,
    /// Number of identifiers the catalog listed for the run.
    pub processed_count: usize,
    /// One entry per identifier, or one per failed group in batch mode.
    pub outcomes: Vec<Outcome>,
    /// One formatted line per failed outcome, plus a marker line when
    /// cancellation cut admission short.
    pub error_lines: Vec<String>,
}

impl DispatchReport {
    /// Count of outcomes that are failures.
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    /// Count of successful outcomes.
    pub fn success_count(&self) -> usize {
        self.outcomes.len() - self.failed_count()
    }
}
