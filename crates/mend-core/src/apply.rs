//! Patch application engine: apply approved fixes, re-run tests, measure.
//!
//! Patches are applied strictly one after another in generation order. A
//! patch that cannot be applied is recorded as failed and the batch moves
//! on. Only a sandbox that is gone altogether aborts the batch.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{
    ApplyResult, Comparison, PatchInstructions, PatchOutcome, Result, TestOutcome, VerifiedPatch,
};
use crate::obs;
use crate::sandbox::{validate_shell_value, Sandbox, SandboxError, SandboxHandle, SandboxPath};

/// How deep [`PatchApplier`] searches the work dir for a misreported file.
const LOCATE_MAX_DEPTH: u32 = 8;

/// Discards uncommitted edits and untracked files.
pub const ROLLBACK_COMMAND: &str = "git checkout -- . && git clean -fd";

// ---------------------------------------------------------------------------
// Failure signal heuristic
// ---------------------------------------------------------------------------

/// Count case-insensitive occurrences of `failed` plus `error` in test output.
///
/// Deliberately coarse: it says nothing about which tests fail, only
/// whether the output got noisier or quieter.
pub fn count_failure_signals(output: &str) -> usize {
    let lower = output.to_lowercase();
    lower.matches("failed").count() + lower.matches("error").count()
}

/// Compare failure signals between two test outputs.
pub fn compare(before: &str, after: &str) -> Comparison {
    Comparison::new(count_failure_signals(before), count_failure_signals(after))
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Applies patches to, and runs commands in, one sandbox at a time.
pub struct PatchApplier {
    sandbox: Arc<dyn Sandbox>,
}

impl PatchApplier {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }

    /// Apply every approved patch in order; others are ignored.
    ///
    /// Returns an error only when the sandbox itself is unavailable.
    pub async fn apply_patches(
        &self,
        handle: &SandboxHandle,
        patches: &[VerifiedPatch],
    ) -> Result<ApplyResult> {
        let mut outcomes = Vec::new();
        for verified in patches.iter().filter(|v| v.is_approved()) {
            let outcome = match self.apply_one(handle, verified).await {
                Ok(outcome) => outcome,
                Err(SandboxError::Unavailable(reason)) => {
                    return Err(SandboxError::Unavailable(reason).into());
                }
                Err(err) => PatchOutcome::failed(&verified.patch.id, err.to_string()),
            };
            obs::emit_patch_applied(&outcome);
            outcomes.push(outcome);
        }
        let result = ApplyResult::from_outcomes(outcomes);
        info!(
            sandbox = handle.key(),
            applied = result.applied_count,
            total = result.total_count,
            "patches applied"
        );
        Ok(result)
    }

    async fn apply_one(
        &self,
        handle: &SandboxHandle,
        verified: &VerifiedPatch,
    ) -> std::result::Result<PatchOutcome, SandboxError> {
        let patch = &verified.patch;
        match &patch.instructions {
            PatchInstructions::Substitution { old, new } => {
                let (path, content) = self.locate(handle, patch.target_file()).await?;
                if !content.contains(old.as_str()) {
                    return Ok(PatchOutcome::failed(
                        &patch.id,
                        format!("text to replace not found in {path}"),
                    ));
                }
                let updated = content.replace(old.as_str(), new);
                if updated == content {
                    debug!(patch_id = %patch.id, "substitution is a no-op");
                    return Ok(PatchOutcome::applied(&patch.id, "no change"));
                }
                self.sandbox
                    .write_file(&handle.container, &path, &updated)
                    .await?;
                Ok(PatchOutcome::applied(&patch.id, format!("updated {path}")))
            }
            PatchInstructions::Command { text } => {
                let output = self
                    .sandbox
                    .execute_command(&handle.container, text, &handle.work_dir)
                    .await?;
                if output.success() {
                    Ok(PatchOutcome::applied(&patch.id, format!("ran `{text}`")))
                } else {
                    Ok(PatchOutcome::failed(
                        &patch.id,
                        format!("`{text}` exited with {}", output.exit_code),
                    ))
                }
            }
            PatchInstructions::ManualReview => Ok(PatchOutcome::failed(
                &patch.id,
                "manual review needed; nothing to apply",
            )),
        }
    }

    /// Read `file` at the path the failure reported.
    ///
    /// Test runners often print paths relative to a package rather than the
    /// work dir. When the reported path is missing, a unique file under the
    /// work dir whose path ends with it is used instead.
    async fn locate(
        &self,
        handle: &SandboxHandle,
        file: &str,
    ) -> std::result::Result<(SandboxPath, String), SandboxError> {
        let reported = handle.work_dir.join(file)?;
        match self.sandbox.read_file(&handle.container, &reported).await {
            Err(SandboxError::FileNotFound(_)) => {}
            other => return other.map(|content| (reported, content)),
        }

        let suffix = format!("/{}", file.trim_start_matches("./").trim_start_matches('/'));
        let root = SandboxPath::new(handle.work_dir.as_str())?;
        let candidates: Vec<String> = self
            .sandbox
            .list_files(&handle.container, &root, LOCATE_MAX_DEPTH)
            .await?
            .into_iter()
            .filter(|candidate| candidate.ends_with(&suffix))
            .collect();
        match candidates.as_slice() {
            [only] => {
                let path = SandboxPath::new(only)?;
                debug!(reported = %reported, resolved = %path, "located patch target");
                let content = self.sandbox.read_file(&handle.container, &path).await?;
                Ok((path, content))
            }
            _ => Err(SandboxError::FileNotFound(reported.to_string())),
        }
    }

    /// Run the test command in the sandbox work dir.
    pub async fn run_tests(&self, handle: &SandboxHandle, test_command: &str) -> Result<TestOutcome> {
        let output = self
            .sandbox
            .execute_command(&handle.container, test_command, &handle.work_dir)
            .await?;
        let outcome = TestOutcome::new(output.exit_code, output.combined());
        debug!(sandbox = handle.key(), exit_code = outcome.exit_code, "tests finished");
        Ok(outcome)
    }

    /// Stage and commit the working tree. Returns `false` when git refused,
    /// e.g. because there was nothing to commit.
    pub async fn commit(&self, handle: &SandboxHandle, message: &str) -> Result<bool> {
        let message = validate_shell_value("commit_message", message)?;
        let command = format!("git add -A && git commit -m '{message}'");
        let output = self
            .sandbox
            .execute_command(&handle.container, &command, &handle.work_dir)
            .await?;
        if !output.success() {
            warn!(sandbox = handle.key(), exit_code = output.exit_code, "commit failed");
        }
        Ok(output.success())
    }

    /// Discard uncommitted changes in the work dir.
    pub async fn rollback(&self, handle: &SandboxHandle) -> Result<()> {
        let output = self
            .sandbox
            .execute_command(&handle.container, ROLLBACK_COMMAND, &handle.work_dir)
            .await?;
        if !output.success() {
            return Err(SandboxError::CommandFailed {
                command: ROLLBACK_COMMAND.to_string(),
                reason: format!("exit code {}: {}", output.exit_code, output.combined()),
            }
            .into());
        }
        info!(sandbox = handle.key(), "working tree rolled back");
        Ok(())
    }
}
