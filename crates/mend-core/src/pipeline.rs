//! Remediation pipeline: Extract → Classify → Patch → Verify → Report.
//!
//! A fixed linear sequence. Each fan-out stage starts only after the
//! previous one has settled for every item. The only errors that escape are
//! invalid input and a hard extraction failure.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::{CallControls, MendConfig};
use crate::domain::{Report, Result};
use crate::extract::FailureExtractor;
use crate::inference::InferenceClient;
use crate::obs;
use crate::stage::{run_stage, Classifier, PatchGenerator, Verifier};

/// Counts derived from a [`Report`], shared by every report projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_failures: usize,
    pub classified: usize,
    pub patched: usize,
    pub verified: usize,
    pub approved: usize,
    /// `"N/A"` without patches, otherwise a two-decimal percentage.
    pub approval_rate: String,
}

impl PipelineStats {
    pub fn from_report(report: &Report) -> Self {
        let patched = report.generated_patches.len();
        let approved = report.final_fixes.len();
        Self {
            total_failures: report.failures.len(),
            classified: report.classified_failures.len(),
            patched,
            verified: report.verified_patches.len(),
            approved,
            approval_rate: approval_rate(approved, patched),
        }
    }
}

/// Format `approved / patched` as a percentage, or `"N/A"` when nothing was patched.
pub fn approval_rate(approved: usize, patched: usize) -> String {
    if patched == 0 {
        return "N/A".to_string();
    }
    format!("{:.2}%", approved as f64 * 100.0 / patched as f64)
}

/// A report together with its statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub report: Report,
    pub stats: PipelineStats,
}

/// Runs the four stages against one inference client.
pub struct RemediationPipeline {
    extractor: FailureExtractor,
    classifier: Arc<Classifier>,
    patcher: Arc<PatchGenerator>,
    verifier: Arc<Verifier>,
}

impl RemediationPipeline {
    pub fn new(client: Arc<dyn InferenceClient>, controls: CallControls) -> Self {
        Self {
            extractor: FailureExtractor::new(Arc::clone(&client), controls.clone()),
            classifier: Arc::new(Classifier::new(Arc::clone(&client), controls.clone())),
            patcher: Arc::new(PatchGenerator::new(Arc::clone(&client), controls.clone())),
            verifier: Arc::new(Verifier::new(client, controls)),
        }
    }

    /// Build a pipeline with the call controls and extraction fallback from `config`.
    pub fn from_config(client: Arc<dyn InferenceClient>, config: &MendConfig) -> Self {
        Self::new(client, config.controls.clone()).with_rule_fallback(config.rule_fallback)
    }

    pub fn with_rule_fallback(mut self, enabled: bool) -> Self {
        self.extractor = self.extractor.with_rule_fallback(enabled);
        self
    }

    /// Run every stage over `logs` and assemble the report.
    pub async fn run(&self, logs: &str) -> Result<Report> {
        let started = Instant::now();
        obs::emit_pipeline_started(logs.len());

        let failures = self.extractor.extract(logs).await?;
        if failures.is_empty() {
            obs::emit_pipeline_finished(0, 0, started.elapsed().as_millis() as u64);
            return Ok(Report::empty());
        }

        let classified = run_stage(Arc::clone(&self.classifier), failures.clone()).await;
        let patches = run_stage(Arc::clone(&self.patcher), classified.clone()).await;
        let verified = run_stage(Arc::clone(&self.verifier), patches.clone()).await;

        let report = Report::assemble(failures, classified, patches, verified);
        obs::emit_pipeline_finished(
            report.failures.len(),
            report.final_fixes.len(),
            started.elapsed().as_millis() as u64,
        );
        Ok(report)
    }

    /// Like [`run`](Self::run), with derived statistics attached.
    pub async fn run_with_stats(&self, logs: &str) -> Result<PipelineOutput> {
        let report = self.run(logs).await?;
        let stats = PipelineStats::from_report(&report);
        Ok(PipelineOutput { report, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_rate_formatting() {
        assert_eq!(approval_rate(0, 0), "N/A");
        assert_eq!(approval_rate(0, 1), "0.00%");
        assert_eq!(approval_rate(1, 3), "33.33%");
        assert_eq!(approval_rate(2, 3), "66.67%");
        assert_eq!(approval_rate(4, 4), "100.00%");
    }

    #[test]
    fn test_stats_for_empty_report() {
        let stats = PipelineStats::from_report(&Report::empty());
        assert_eq!(stats.total_failures, 0);
        assert_eq!(stats.patched, 0);
        assert_eq!(stats.approval_rate, "N/A");
    }
}
