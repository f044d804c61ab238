//! Pipeline report: every stage's output, side by side.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::failure::{ClassifiedFailure, Failure};
use super::patch::{Patch, VerifiedPatch};

/// Aggregated output of one pipeline run.
///
/// Stage vectors are index-aligned: element `i` of every vector descends
/// from `failures[i]`. `final_fixes` holds exactly the approved patches,
/// in generation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub failures: Vec<Failure>,
    pub classified_failures: Vec<ClassifiedFailure>,
    pub generated_patches: Vec<Patch>,
    pub verified_patches: Vec<VerifiedPatch>,
    pub final_fixes: Vec<VerifiedPatch>,
}

impl Report {
    /// Assemble a report, deriving `final_fixes` from the verified patches.
    pub fn assemble(
        failures: Vec<Failure>,
        classified_failures: Vec<ClassifiedFailure>,
        generated_patches: Vec<Patch>,
        verified_patches: Vec<VerifiedPatch>,
    ) -> Self {
        let final_fixes = verified_patches
            .iter()
            .filter(|v| v.is_approved())
            .cloned()
            .collect();
        Self {
            failures,
            classified_failures,
            generated_patches,
            verified_patches,
            final_fixes,
        }
    }

    /// Report for logs with nothing actionable in them.
    pub fn empty() -> Self {
        Self::assemble(Vec::new(), Vec::new(), Vec::new(), Vec::new())
    }

    /// Whether every stage produced one output per input.
    pub fn is_aligned(&self) -> bool {
        let n = self.failures.len();
        self.classified_failures.len() == n
            && self.generated_patches.len() == n
            && self.verified_patches.len() == n
    }

    /// SHA-256 hex digest of the report's JSON encoding.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}
