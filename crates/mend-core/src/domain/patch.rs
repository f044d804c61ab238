//! Patch proposals and their verification verdicts.

use serde::{Deserialize, Serialize};

use super::failure::ClassifiedFailure;

/// Instruction text used for the manual-review sentinel.
pub const MANUAL_REVIEW: &str = "manual review needed";

/// How a patch mutates the sandbox.
///
/// The dialect is decided once, when the patch is generated. The
/// application engine dispatches on the variant and never re-reads free
/// text to guess what a patch means.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchInstructions {
    /// Global find/replace of `old` with `new` in the failure's source file.
    Substitution { old: String, new: String },
    /// Literal shell command run in the sandbox work dir.
    Command { text: String },
    /// Nothing mechanical could be proposed.
    ManualReview,
}

impl PatchInstructions {
    pub fn is_manual_review(&self) -> bool {
        matches!(self, PatchInstructions::ManualReview)
    }
}

impl std::fmt::Display for PatchInstructions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchInstructions::Substitution { old, new } => write!(f, "{old} → {new}"),
            PatchInstructions::Command { text } => f.write_str(text),
            PatchInstructions::ManualReview => f.write_str(MANUAL_REVIEW),
        }
    }
}

/// A proposed fix for one classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub id: String,
    pub classified: ClassifiedFailure,
    pub instructions: PatchInstructions,
    /// What should change in the test output once the patch is applied.
    pub expected_observable: String,
}

impl Patch {
    pub fn new(
        classified: ClassifiedFailure,
        instructions: PatchInstructions,
        expected_observable: impl Into<String>,
    ) -> Self {
        let id = patch_id_for(&classified.failure.id);
        Self {
            id,
            classified,
            instructions,
            expected_observable: expected_observable.into(),
        }
    }

    /// Sentinel used when patch generation could not produce a result.
    pub fn manual_review(classified: ClassifiedFailure) -> Self {
        Self::new(classified, PatchInstructions::ManualReview, "")
    }

    /// Path of the file a substitution targets.
    pub fn target_file(&self) -> &str {
        &self.classified.failure.source_file
    }
}

fn patch_id_for(failure_id: &str) -> String {
    match failure_id.strip_prefix("failure-") {
        Some(n) => format!("patch-{n}"),
        None => format!("patch-{failure_id}"),
    }
}

/// Verification verdict for a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Approved,
    Rejected,
    PendingReview,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStatus::Approved => write!(f, "Approved"),
            VerificationStatus::Rejected => write!(f, "Rejected"),
            VerificationStatus::PendingReview => write!(f, "PendingReview"),
        }
    }
}

/// A [`Patch`] with its verification verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedPatch {
    pub patch: Patch,
    pub status: VerificationStatus,
    /// Reviewer reasoning, or why no verdict was reached.
    pub rationale: String,
}

impl VerifiedPatch {
    pub fn new(patch: Patch, status: VerificationStatus, rationale: impl Into<String>) -> Self {
        Self {
            patch,
            status,
            rationale: rationale.into(),
        }
    }

    /// Sentinel used when verification could not produce a verdict.
    pub fn pending(patch: Patch, rationale: impl Into<String>) -> Self {
        Self::new(patch, VerificationStatus::PendingReview, rationale)
    }

    pub fn is_approved(&self) -> bool {
        self.status == VerificationStatus::Approved
    }
}
