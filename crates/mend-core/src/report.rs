//! Report projections: structured JSON, narrative text and a condensed summary.
//!
//! All projections are pure functions of one [`Report`] and take their
//! counts from [`PipelineStats::from_report`], so they always agree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{BugCategory, HealingSession, Report, Result, VerificationStatus};
use crate::pipeline::PipelineStats;

/// Pretty-printed JSON of the full report.
pub fn to_structured_json(report: &Report) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Render the human-readable report.
pub fn render_narrative(report: &Report) -> String {
    let stats = PipelineStats::from_report(report);
    let mut out = String::new();
    out.push_str("# Remediation Report\n\n");
    out.push_str("## Summary\n");
    out.push_str(&format!(
        "- failures: {}\n- classified: {}\n- patched: {}\n- verified: {}\n- approved: {}\n- approval rate: {}\n\n",
        stats.total_failures,
        stats.classified,
        stats.patched,
        stats.verified,
        stats.approved,
        stats.approval_rate
    ));

    out.push_str("## Approved Fixes\n");
    if report.final_fixes.is_empty() {
        out.push_str("- none\n");
    }
    for fix in &report.final_fixes {
        let failure = &fix.patch.classified.failure;
        out.push_str(&format!(
            "### {} ({})\n- location: `{}`\n- failure: {}\n- change: {}\n",
            fix.patch.id,
            fix.patch.classified.category,
            failure.location(),
            failure.message,
            fix.patch.instructions
        ));
        if !fix.patch.expected_observable.is_empty() {
            out.push_str(&format!("- expected: {}\n", fix.patch.expected_observable));
        }
        if !fix.rationale.is_empty() {
            out.push_str(&format!("- rationale: {}\n", fix.rationale));
        }
    }
    out.push('\n');

    out.push_str("## Rejected Patches\n");
    let rejected: Vec<_> = report
        .verified_patches
        .iter()
        .filter(|v| v.status != VerificationStatus::Approved)
        .collect();
    if rejected.is_empty() {
        out.push_str("- none\n");
    }
    for verified in rejected {
        out.push_str(&format!(
            "- {} `{}` [{}]: {} ({})\n",
            verified.patch.id,
            verified.patch.classified.failure.location(),
            verified.status,
            verified.patch.instructions,
            verified.rationale
        ));
    }
    out
}

/// Counts plus a failure-category histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CondensedReport {
    pub total_failures: usize,
    pub classified: usize,
    pub patched: usize,
    pub verified: usize,
    pub approved: usize,
    pub approval_rate: String,
    pub categories: BTreeMap<BugCategory, usize>,
}

impl CondensedReport {
    pub fn from_report(report: &Report) -> Self {
        let stats = PipelineStats::from_report(report);
        let mut categories = BTreeMap::new();
        for classified in &report.classified_failures {
            *categories.entry(classified.category).or_insert(0) += 1;
        }
        Self {
            total_failures: stats.total_failures,
            classified: stats.classified,
            patched: stats.patched,
            verified: stats.verified,
            approved: stats.approved,
            approval_rate: stats.approval_rate,
            categories,
        }
    }

    /// One line of counts followed by one line per category.
    pub fn render(&self) -> String {
        let mut out = format!(
            "failures={} classified={} patched={} verified={} approved={} approval_rate={}\n",
            self.total_failures,
            self.classified,
            self.patched,
            self.verified,
            self.approved,
            self.approval_rate
        );
        for (category, count) in &self.categories {
            out.push_str(&format!("  {category}: {count}\n"));
        }
        out
    }
}

/// Render a healing session as one line per iteration plus the outcome.
pub fn render_session(session: &HealingSession) -> String {
    let mut out = format!(
        "# Healing Session {}\n\n- sandbox: `{}`\n- outcome: {}\n- iterations: {}/{}\n",
        session.id,
        session.sandbox_id,
        session.outcome,
        session.iteration_count(),
        session.max_iterations
    );
    if let Some(error) = &session.error {
        out.push_str(&format!("- error: {error}\n"));
    }
    out.push('\n');
    for iteration in &session.iterations {
        let stats = PipelineStats::from_report(&iteration.report);
        out.push_str(&format!(
            "## Iteration {}\n- failures: {}\n- approved: {}\n",
            iteration.number, stats.total_failures, stats.approved
        ));
        if let Some(applied) = &iteration.apply_result {
            out.push_str(&format!(
                "- applied: {}/{}\n",
                applied.applied_count, applied.total_count
            ));
        }
        if let Some(tests) = &iteration.test_outcome {
            out.push_str(&format!(
                "- tests: {} (exit {})\n",
                if tests.passed { "passed" } else { "failed" },
                tests.exit_code
            ));
        }
        if let Some(comparison) = &iteration.comparison {
            out.push_str(&format!(
                "- failure signals: {} -> {} ({:?})\n",
                comparison.before_failure_count,
                comparison.after_failure_count,
                comparison.recommendation()
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClassifiedFailure, Failure, Patch, PatchInstructions, VerifiedPatch};

    fn sample() -> Report {
        let failures = vec![
            Failure::new(0, "a.js", 10, "TypeError: x"),
            Failure::new(1, "b.js", 0, "ReferenceError: y"),
            Failure::new(2, "c.js", 3, "TypeError: z"),
        ];
        let classified = vec![
            ClassifiedFailure::new(failures[0].clone(), BugCategory::TypeError),
            ClassifiedFailure::new(failures[1].clone(), BugCategory::ReferenceError),
            ClassifiedFailure::new(failures[2].clone(), BugCategory::TypeError),
        ];
        let patches = vec![
            Patch::new(
                classified[0].clone(),
                PatchInstructions::Substitution {
                    old: "x".into(),
                    new: "X".into(),
                },
                "a.js passes",
            ),
            Patch::manual_review(classified[1].clone()),
            Patch::new(
                classified[2].clone(),
                PatchInstructions::Command {
                    text: "npm install z".into(),
                },
                "",
            ),
        ];
        let verified = vec![
            VerifiedPatch::new(patches[0].clone(), VerificationStatus::Approved, "minimal"),
            VerifiedPatch::pending(patches[1].clone(), "no mechanical fix proposed"),
            VerifiedPatch::new(patches[2].clone(), VerificationStatus::Rejected, "wrong package"),
        ];
        Report::assemble(failures, classified, patches, verified)
    }

    #[test]
    fn test_narrative_sections() {
        let text = render_narrative(&sample());
        assert!(text.contains("## Summary"));
        assert!(text.contains("- approved: 1"));
        assert!(text.contains("- approval rate: 33.33%"));
        assert!(text.contains("### patch-1 (TYPE_ERROR)"));
        assert!(text.contains("- change: x → X"));
        assert!(text.contains("patch-2 `b.js` [PendingReview]: manual review needed"));
        assert!(text.contains("patch-3 `c.js:3` [Rejected]: npm install z (wrong package)"));
    }

    #[test]
    fn test_condensed_agrees_with_stats() {
        let report = sample();
        let condensed = CondensedReport::from_report(&report);
        let stats = PipelineStats::from_report(&report);
        assert_eq!(condensed.total_failures, stats.total_failures);
        assert_eq!(condensed.approved, stats.approved);
        assert_eq!(condensed.approval_rate, stats.approval_rate);
        assert_eq!(condensed.categories[&BugCategory::TypeError], 2);
        assert_eq!(condensed.categories[&BugCategory::ReferenceError], 1);
        assert_eq!(condensed.categories.values().sum::<usize>(), stats.classified);
        assert!(condensed.render().contains("TYPE_ERROR: 2"));
    }

    #[test]
    fn test_structured_json_round_trips() {
        let report = sample();
        let json = to_structured_json(&report).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_empty_report_projections() {
        let report = Report::empty();
        assert!(render_narrative(&report).contains("- approval rate: N/A"));
        assert!(CondensedReport::from_report(&report).categories.is_empty());
    }
}
