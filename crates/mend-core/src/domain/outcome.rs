//! Results of applying patches and re-running the test command.

use serde::{Deserialize, Serialize};

/// Per-patch application status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    Applied,
    Failed,
}

/// What happened to one patch during application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOutcome {
    pub patch_id: String,
    pub status: PatchStatus,
    pub detail: String,
}

impl PatchOutcome {
    pub fn applied(patch_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            patch_id: patch_id.into(),
            status: PatchStatus::Applied,
            detail: detail.into(),
        }
    }

    pub fn failed(patch_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            patch_id: patch_id.into(),
            status: PatchStatus::Failed,
            detail: detail.into(),
        }
    }
}

/// Result of applying a batch of patches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub applied_count: usize,
    pub total_count: usize,
    pub outcomes: Vec<PatchOutcome>,
}

impl ApplyResult {
    pub fn from_outcomes(outcomes: Vec<PatchOutcome>) -> Self {
        let applied_count = outcomes
            .iter()
            .filter(|o| o.status == PatchStatus::Applied)
            .count();
        Self {
            applied_count,
            total_count: outcomes.len(),
            outcomes,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.total_count - self.applied_count
    }
}

/// Outcome of one test-command run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub exit_code: i32,
    /// Combined stdout and stderr.
    pub output: String,
    pub passed: bool,
}

impl TestOutcome {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
            passed: exit_code == 0,
        }
    }
}

/// Before/after failure-signal comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub before_failure_count: usize,
    pub after_failure_count: usize,
    pub improved: bool,
    /// `before - after`; positive means fewer failure signals.
    pub delta: i64,
}

impl Comparison {
    pub fn new(before_failure_count: usize, after_failure_count: usize) -> Self {
        Self {
            before_failure_count,
            after_failure_count,
            improved: after_failure_count < before_failure_count,
            delta: before_failure_count as i64 - after_failure_count as i64,
        }
    }

    pub fn recommendation(&self) -> Recommendation {
        if self.improved {
            Recommendation::Commit
        } else {
            Recommendation::Rollback
        }
    }
}

/// What the engine suggests the caller do with the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Commit,
    Rollback,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_result_counts() {
        let result = ApplyResult::from_outcomes(vec![
            PatchOutcome::applied("patch-1", "replaced 1 occurrence"),
            PatchOutcome::failed("patch-2", "pattern not found"),
            PatchOutcome::applied("patch-3", "exit 0"),
        ]);
        assert_eq!(result.applied_count, 2);
        assert_eq!(result.total_count, 3);
        assert_eq!(result.failed_count(), 1);
    }

    #[test]
    fn test_comparison_improved_only_when_strictly_lower() {
        let better = Comparison::new(4, 1);
        assert!(better.improved);
        assert_eq!(better.delta, 3);
        assert_eq!(better.recommendation(), Recommendation::Commit);

        let same = Comparison::new(2, 2);
        assert!(!same.improved);
        assert_eq!(same.delta, 0);
        assert_eq!(same.recommendation(), Recommendation::Rollback);

        let worse = Comparison::new(1, 3);
        assert!(!worse.improved);
        assert_eq!(worse.delta, -2);
    }

    #[test]
    fn test_outcome_passed_tracks_exit_code() {
        assert!(TestOutcome::new(0, "ok").passed);
        assert!(!TestOutcome::new(1, "1 failed").passed);
        assert!(!TestOutcome::new(-1, "killed").passed);
    }
}
