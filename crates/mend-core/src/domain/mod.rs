//! Domain models for Mend.
//!
//! Canonical definitions for the append-only remediation chain:
//! - `Failure` → `ClassifiedFailure` → `Patch` → `VerifiedPatch`
//! - `Report`: every stage's output for one pipeline run
//! - `ApplyResult`, `TestOutcome`, `Comparison`: what happened in the sandbox
//! - `HealingSession`: ordered iterations of the healing loop

pub mod error;
pub mod failure;
pub mod outcome;
pub mod patch;
pub mod report;
pub mod session;

pub use error::{MendError, Result};
pub use failure::{BugCategory, ClassifiedFailure, Failure};
pub use outcome::{
    ApplyResult, Comparison, PatchOutcome, PatchStatus, Recommendation, TestOutcome,
};
pub use patch::{Patch, PatchInstructions, VerificationStatus, VerifiedPatch, MANUAL_REVIEW};
pub use report::Report;
pub use session::{HealingIteration, HealingSession, SessionOutcome};
