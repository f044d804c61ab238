//! Healing loop controller.
//!
//! Each iteration runs the pipeline on the current logs, applies the
//! approved fixes, re-runs the test command and adopts its output as the
//! next iteration's logs. The loop stops on the first of:
//!
//! 1. no approved fixes → `NoFixesAvailable` (nothing applied, tests not re-run)
//! 2. tests pass → `Success`
//! 3. the iteration budget is spent → `Exhausted`
//! 4. a hard pipeline or sandbox failure → `Error`
//! 5. cancellation observed between iterations → `Cancelled`
//!
//! Persisting failures and newly introduced ones both simply consume budget.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::apply::{compare, PatchApplier};
use crate::config::{HealingConfig, DEFAULT_MAX_ITERATIONS};
use crate::domain::{HealingIteration, HealingSession, MendError, Result, SessionOutcome};
use crate::obs::{self, SessionSpan};
use crate::pipeline::RemediationPipeline;
use crate::sandbox::{Sandbox, SandboxHandle};

/// Input to one healing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingRequest {
    pub initial_logs: String,
    pub sandbox: SandboxHandle,
    pub test_command: String,
    pub max_iterations: u32,
}

impl HealingRequest {
    /// Validate the sandbox coordinates and build a request with the default budget.
    pub fn new(
        initial_logs: impl Into<String>,
        container_id: &str,
        work_dir: &str,
        test_command: &str,
    ) -> Result<Self> {
        let sandbox = SandboxHandle::new(container_id, work_dir)?;
        if test_command.trim().is_empty() {
            return Err(MendError::InvalidInput("test command must not be empty".to_string()));
        }
        Ok(Self {
            initial_logs: initial_logs.into(),
            sandbox,
            test_command: test_command.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        })
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(MendError::InvalidInput(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.initial_logs.trim().is_empty() {
            return Err(MendError::InvalidInput("initial logs must not be empty".to_string()));
        }
        if self.test_command.trim().is_empty() {
            return Err(MendError::InvalidInput("test command must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Registry of sandboxes with a healing cycle in flight.
///
/// Clones share one set. Controllers use the process-wide registry unless
/// given another one, so two controllers never heal the same container at
/// once.
#[derive(Debug, Clone, Default)]
pub struct ActiveSandboxes {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl ActiveSandboxes {
    /// An isolated registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Self {
        static GLOBAL: OnceLock<ActiveSandboxes> = OnceLock::new();
        GLOBAL.get_or_init(ActiveSandboxes::new).clone()
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds a sandbox's slot in the registry until dropped.
struct ActiveGuard {
    active: ActiveSandboxes,
    key: String,
}

impl ActiveGuard {
    fn acquire(active: &ActiveSandboxes, key: &str) -> Result<Self> {
        if !active.lock().insert(key.to_string()) {
            return Err(MendError::SandboxBusy(key.to_string()));
        }
        Ok(Self {
            active: active.clone(),
            key: key.to_string(),
        })
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}

/// Drives the pipeline → apply → re-test loop against sandboxes.
pub struct HealingController {
    pipeline: RemediationPipeline,
    applier: PatchApplier,
    commit_on_improvement: bool,
    active: ActiveSandboxes,
    cancel: Option<watch::Receiver<bool>>,
}

impl HealingController {
    pub fn new(pipeline: RemediationPipeline, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            pipeline,
            applier: PatchApplier::new(sandbox),
            commit_on_improvement: false,
            active: ActiveSandboxes::global(),
            cancel: None,
        }
    }

    /// Track in-flight cycles in `active` instead of the process-wide registry.
    pub fn with_active_sandboxes(mut self, active: ActiveSandboxes) -> Self {
        self.active = active;
        self
    }

    pub fn with_config(mut self, config: &HealingConfig) -> Self {
        self.commit_on_improvement = config.commit_on_improvement;
        self
    }

    /// Commit the working tree after any iteration that reduces failure signals.
    pub fn with_commit_on_improvement(mut self, enabled: bool) -> Self {
        self.commit_on_improvement = enabled;
        self
    }

    /// Stop at the next iteration boundary once `cancel` holds `true`.
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn applier(&self) -> &PatchApplier {
        &self.applier
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run the healing loop to completion.
    ///
    /// Fails only on invalid input or when another cycle already holds the
    /// sandbox; every other ending is recorded in the returned session.
    pub async fn heal(&self, request: HealingRequest) -> Result<HealingSession> {
        request.validate()?;
        let _guard = ActiveGuard::acquire(&self.active, request.sandbox.key())?;

        let session_id = Uuid::new_v4().to_string();
        let span = SessionSpan::span(&session_id, request.sandbox.key());
        self.run_session(request, session_id).instrument(span).await
    }

    async fn run_session(&self, request: HealingRequest, session_id: String) -> Result<HealingSession> {
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(max_iterations = request.max_iterations, "healing started");

        let mut iterations = Vec::new();
        let mut current_logs = request.initial_logs.clone();
        let mut error = None;
        let mut number = 0u32;

        let outcome = loop {
            if self.cancelled() {
                break SessionOutcome::Cancelled;
            }
            number += 1;

            let report = match self.pipeline.run(&current_logs).await {
                Ok(report) => report,
                Err(err) => {
                    error = Some(format!("pipeline failed in iteration {number}: {err}"));
                    break SessionOutcome::Error;
                }
            };
            let mut iteration = HealingIteration {
                number,
                report_digest: report.digest(),
                report,
                apply_result: None,
                test_outcome: None,
                comparison: None,
            };
            let approved = iteration.report.final_fixes.len();

            if approved == 0 {
                obs::emit_healing_iteration(number, 0, None);
                iterations.push(iteration);
                break SessionOutcome::NoFixesAvailable;
            }

            match self
                .applier
                .apply_patches(&request.sandbox, &iteration.report.final_fixes)
                .await
            {
                Ok(applied) => iteration.apply_result = Some(applied),
                Err(err) => {
                    error = Some(format!("applying fixes in iteration {number}: {err}"));
                    iterations.push(iteration);
                    break SessionOutcome::Error;
                }
            }

            let tests = match self
                .applier
                .run_tests(&request.sandbox, &request.test_command)
                .await
            {
                Ok(tests) => tests,
                Err(err) => {
                    error = Some(format!("re-running tests in iteration {number}: {err}"));
                    iterations.push(iteration);
                    break SessionOutcome::Error;
                }
            };
            let comparison = compare(&current_logs, &tests.output);
            obs::emit_healing_iteration(number, approved, Some(tests.passed));

            if comparison.improved && self.commit_on_improvement {
                let message = format!("mend: iteration {number} applied {approved} fixes");
                if let Err(err) = self.applier.commit(&request.sandbox, &message).await {
                    warn!(iteration = number, error = %err, "commit after improvement failed");
                }
            }

            let passed = tests.passed;
            current_logs = tests.output.clone();
            iteration.test_outcome = Some(tests);
            iteration.comparison = Some(comparison);
            iterations.push(iteration);

            if passed {
                break SessionOutcome::Success;
            }
            if number >= request.max_iterations {
                break SessionOutcome::Exhausted;
            }
        };

        if let Some(message) = &error {
            warn!(error = %message, "healing ended with an error");
        }
        obs::emit_healing_finished(outcome, iterations.len(), clock.elapsed().as_millis() as u64);

        Ok(HealingSession {
            id: session_id,
            sandbox_id: request.sandbox.key().to_string(),
            max_iterations: request.max_iterations,
            iterations,
            outcome,
            error,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CallControls;
    use crate::fakes::{MemorySandbox, OfflineInference};

    fn pipeline() -> RemediationPipeline {
        RemediationPipeline::new(
            Arc::new(OfflineInference),
            CallControls {
                timeout_ms: 100,
                max_retries: 0,
                backoff_base_ms: 1,
            },
        )
    }

    #[test]
    fn test_request_validation() {
        assert!(HealingRequest::new("logs", "ls; rm -rf /", "/app", "npm test").is_err());
        assert!(HealingRequest::new("logs", "ctr", "/app", "  ").is_err());
        let request = HealingRequest::new("logs", "ctr", "/app", "npm test").unwrap();
        assert_eq!(request.max_iterations, DEFAULT_MAX_ITERATIONS);
        assert!(request.with_max_iterations(0).validate().is_err());
    }

    #[test]
    fn test_active_guard_releases_on_drop() {
        let active = ActiveSandboxes::new();
        let guard = ActiveGuard::acquire(&active, "ctr").unwrap();
        assert!(active.is_active("ctr"));
        assert!(matches!(
            ActiveGuard::acquire(&active, "ctr"),
            Err(MendError::SandboxBusy(_))
        ));
        drop(guard);
        assert!(!active.is_active("ctr"));
        assert!(ActiveGuard::acquire(&active, "ctr").is_ok());
    }

    #[test]
    fn test_global_registry_is_shared() {
        let guard = ActiveGuard::acquire(&ActiveSandboxes::global(), "ctr-shared-registry").unwrap();
        assert!(ActiveSandboxes::global().is_active("ctr-shared-registry"));
        assert!(!ActiveSandboxes::new().is_active("ctr-shared-registry"));
        drop(guard);
        assert!(!ActiveSandboxes::global().is_active("ctr-shared-registry"));
    }

    #[tokio::test]
    async fn test_empty_test_command_rejected_before_side_effects() {
        let sandbox = Arc::new(MemorySandbox::new());
        let controller = HealingController::new(pipeline(), sandbox.clone())
            .with_active_sandboxes(ActiveSandboxes::new());
        let request = HealingRequest {
            initial_logs: "FAIL a.js".to_string(),
            sandbox: SandboxHandle::new("ctr", "/app").unwrap(),
            test_command: "   ".to_string(),
            max_iterations: 1,
        };
        let err = controller.heal(request).await.unwrap_err();
        assert!(matches!(err, MendError::InvalidInput(_)));
        assert_eq!(sandbox.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_iteration() {
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let sandbox = Arc::new(MemorySandbox::new());
        let controller = HealingController::new(pipeline(), sandbox.clone())
            .with_active_sandboxes(ActiveSandboxes::new())
            .with_cancellation(rx);
        let request = HealingRequest::new("FAIL a.js", "ctr", "/app", "npm test").unwrap();
        let session = controller.heal(request).await.unwrap();
        assert_eq!(session.outcome, SessionOutcome::Cancelled);
        assert!(session.iterations.is_empty());
        assert_eq!(sandbox.call_count(), 0);
    }

    #[tokio::test]
    async fn test_offline_inference_yields_no_fixes() {
        let sandbox = Arc::new(MemorySandbox::new());
        let controller = HealingController::new(pipeline(), sandbox.clone())
            .with_active_sandboxes(ActiveSandboxes::new());
        let request = HealingRequest::new(
            "FAIL a.js\n  TypeError: x is not defined at a.js:10",
            "ctr",
            "/app",
            "npm test",
        )
        .unwrap();
        let session = controller.heal(request).await.unwrap();
        assert_eq!(session.outcome, SessionOutcome::NoFixesAvailable);
        assert_eq!(session.iteration_count(), 1);
        assert!(session.iterations[0].apply_result.is_none());
        assert_eq!(sandbox.call_count(), 0);
    }
}
