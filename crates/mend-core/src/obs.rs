//! Structured observability hooks for pipeline and healing lifecycle events.
//!
//! Every hook emits one `tracing` event with a stable `event` field so log
//! pipelines can filter on it:
//!
//! | event | level |
//! |---|---|
//! | `pipeline.started` / `pipeline.finished` | info |
//! | `stage.item_degraded` | warn |
//! | `patch.applied` | info (debug detail on failure) |
//! | `healing.iteration` / `healing.finished` | info |
//!
//! For JSON output, run the binary with `--json`.

use tracing::{info, warn};

use crate::domain::{PatchOutcome, PatchStatus, SessionOutcome};

/// RAII guard that enters a session-scoped span for the duration of a heal.
///
/// ```ignore
/// let _span = SessionSpan::enter("session-1", "ctr-1");
/// // every event below carries session_id and sandbox
/// ```
///
/// Async code should use [`SessionSpan::span`] with `Instrument` instead.
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(session_id: &str, sandbox: &str) -> Self {
        Self {
            _span: Self::span(session_id, sandbox).entered(),
        }
    }

    /// The bare span, for instrumenting a future instead of entering it.
    pub fn span(session_id: &str, sandbox: &str) -> tracing::Span {
        tracing::info_span!("mend.session", session_id = %session_id, sandbox = %sandbox)
    }
}

pub fn emit_pipeline_started(log_bytes: usize) {
    info!(event = "pipeline.started", log_bytes = log_bytes);
}

pub fn emit_pipeline_finished(failures: usize, approved: usize, duration_ms: u64) {
    info!(
        event = "pipeline.finished",
        failures = failures,
        approved = approved,
        duration_ms = duration_ms,
    );
}

/// One fan-out item fell back to its sentinel.
pub fn emit_item_degraded(stage: &str, reason: &str) {
    warn!(event = "stage.item_degraded", stage = %stage, reason = %reason);
}

pub fn emit_patch_applied(outcome: &PatchOutcome) {
    let applied = outcome.status == PatchStatus::Applied;
    info!(
        event = "patch.applied",
        patch_id = %outcome.patch_id,
        applied = applied,
        detail = %outcome.detail,
    );
}

pub fn emit_healing_iteration(iteration: u32, approved: usize, passed: Option<bool>) {
    info!(
        event = "healing.iteration",
        iteration = iteration,
        approved = approved,
        passed = ?passed,
    );
}

pub fn emit_healing_finished(outcome: SessionOutcome, iterations: usize, duration_ms: u64) {
    info!(
        event = "healing.finished",
        outcome = %outcome,
        iterations = iterations,
        duration_ms = duration_ms,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_span_create() {
        let _span = SessionSpan::enter("session-1", "ctr-1");
        emit_item_degraded("classify", "timed out");
        emit_patch_applied(&PatchOutcome::failed("patch-1", "old text not found"));
    }
}
