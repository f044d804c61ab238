//! Verifier stage: `Patch` → `VerifiedPatch`, fail-closed.
//!
//! A patch is approved only when the reviewer's answer leads with the exact
//! approval token and never mentions the rejection token. Empty, hedging,
//! malformed or unreachable answers leave the patch pending review; an
//! explicit rejection marks it rejected. Nothing is approved by default.

use std::sync::Arc;

use async_trait::async_trait;

use super::{complete_with_controls, FanOutStage, StageError};
use crate::config::CallControls;
use crate::domain::{Patch, VerificationStatus, VerifiedPatch};
use crate::inference::parse::strip_code_fences;
use crate::inference::prompts::{self, APPROVAL_TOKEN, REJECTION_TOKEN};
use crate::inference::InferenceClient;

const MAX_RATIONALE_CHARS: usize = 300;

/// Gates patches before anything touches the sandbox.
pub struct Verifier {
    client: Arc<dyn InferenceClient>,
    controls: CallControls,
}

impl Verifier {
    pub fn new(client: Arc<dyn InferenceClient>, controls: CallControls) -> Self {
        Self { client, controls }
    }
}

#[async_trait]
impl FanOutStage for Verifier {
    type Input = Patch;
    type Output = VerifiedPatch;
    const NAME: &'static str = "verify";

    async fn process(&self, patch: Patch) -> Result<VerifiedPatch, StageError> {
        if patch.instructions.is_manual_review() {
            return Ok(VerifiedPatch::pending(patch, "no mechanical fix proposed"));
        }
        let prompt = prompts::verification_prompt(&patch);
        let response = complete_with_controls(self.client.as_ref(), &prompt, &self.controls).await?;
        let (status, rationale) = parse_verdict(&response);
        Ok(VerifiedPatch::new(patch, status, rationale))
    }

    fn sentinel(patch: Patch, reason: &str) -> VerifiedPatch {
        VerifiedPatch::pending(patch, reason)
    }
}

/// Decide a verdict from a reviewer response.
pub fn parse_verdict(response: &str) -> (VerificationStatus, String) {
    let text = strip_code_fences(response);
    let mut words = text.splitn(2, char::is_whitespace);
    let first = words
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| matches!(c, '*' | '_' | '`' | '"' | ':' | '.' | ',' | '!'));
    let rest = words.next().unwrap_or_default().trim();
    let rationale: String = rest.chars().take(MAX_RATIONALE_CHARS).collect();

    if text.is_empty() {
        return (VerificationStatus::PendingReview, "empty review".to_string());
    }
    if first == REJECTION_TOKEN {
        return (VerificationStatus::Rejected, rationale);
    }
    if first == APPROVAL_TOKEN && !text.to_ascii_uppercase().contains(REJECTION_TOKEN) {
        return (VerificationStatus::Approved, rationale);
    }
    (
        VerificationStatus::PendingReview,
        format!(
            "no unambiguous verdict: {}",
            text.chars().take(MAX_RATIONALE_CHARS).collect::<String>()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BugCategory, ClassifiedFailure, Failure};

    fn status(response: &str) -> VerificationStatus {
        parse_verdict(response).0
    }

    #[test]
    fn test_approval_requires_leading_token() {
        assert_eq!(status("APPROVED"), VerificationStatus::Approved);
        assert_eq!(status("APPROVED: minimal and correct"), VerificationStatus::Approved);
        assert_eq!(status("**APPROVED**"), VerificationStatus::Approved);
        assert_eq!(status("```\nAPPROVED\n```"), VerificationStatus::Approved);
    }

    #[test]
    fn test_fail_closed_on_anything_else() {
        assert_eq!(status(""), VerificationStatus::PendingReview);
        assert_eq!(status("   "), VerificationStatus::PendingReview);
        assert_eq!(status("REJECTED"), VerificationStatus::Rejected);
        assert_eq!(status("REJECTED: changes the wrong file"), VerificationStatus::Rejected);
        assert_eq!(status("NOT APPROVED"), VerificationStatus::PendingReview);
        assert_eq!(status("approved"), VerificationStatus::PendingReview);
        assert_eq!(status("APPROVED? hard to say"), VerificationStatus::PendingReview);
        assert_eq!(
            status("This looks reasonable and should fix the test."),
            VerificationStatus::PendingReview
        );
        assert_eq!(
            status("APPROVED at first glance, but REJECTED on reflection"),
            VerificationStatus::PendingReview
        );
        assert_eq!(
            status("The reviewer would say APPROVED"),
            VerificationStatus::PendingReview
        );
    }

    #[test]
    fn test_rationale_is_kept() {
        let (_, rationale) = parse_verdict("APPROVED fixes the undefined variable");
        assert_eq!(rationale, "fixes the undefined variable");
    }

    #[test]
    fn test_sentinel_is_pending() {
        let classified =
            ClassifiedFailure::new(Failure::new(0, "a.js", 1, "boom"), BugCategory::TypeError);
        let verified = Verifier::sentinel(Patch::manual_review(classified), "timed out");
        assert_eq!(verified.status, VerificationStatus::PendingReview);
        assert_eq!(verified.rationale, "timed out");
    }
}
