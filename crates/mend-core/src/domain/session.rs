//! Healing session records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::outcome::{ApplyResult, Comparison, TestOutcome};
use super::report::Report;

/// Terminal state of a healing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The test command passed after applying fixes.
    Success,
    /// The iteration budget ran out with tests still failing.
    Exhausted,
    /// The pipeline produced no approved fixes.
    NoFixesAvailable,
    /// A collaborator failed hard mid-session.
    Error,
    /// Cancellation was requested between iterations.
    Cancelled,
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionOutcome::Success => "success",
            SessionOutcome::Exhausted => "exhausted",
            SessionOutcome::NoFixesAvailable => "no_fixes_available",
            SessionOutcome::Error => "error",
            SessionOutcome::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One pipeline → apply → re-test cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingIteration {
    /// 1-based.
    pub number: u32,
    pub report: Report,
    pub report_digest: String,
    /// Absent when the iteration stopped before applying anything.
    pub apply_result: Option<ApplyResult>,
    pub test_outcome: Option<TestOutcome>,
    pub comparison: Option<Comparison>,
}

/// Ordered record of a whole healing run against one sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingSession {
    pub id: String,
    pub sandbox_id: String,
    pub max_iterations: u32,
    pub iterations: Vec<HealingIteration>,
    pub outcome: SessionOutcome,
    /// Set when `outcome` is [`SessionOutcome::Error`].
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HealingSession {
    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }

    pub fn last_iteration(&self) -> Option<&HealingIteration> {
        self.iterations.last()
    }

    pub fn total_applied(&self) -> usize {
        self.iterations
            .iter()
            .filter_map(|i| i.apply_result.as_ref())
            .map(|r| r.applied_count)
            .sum()
    }
}
