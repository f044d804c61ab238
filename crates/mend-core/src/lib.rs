//! Mend Core Library
//!
//! Automated triage and remediation of failing test suites:
//! extract → classify → patch → verify, then a bounded
//! apply / re-test healing loop against a sandbox.

pub mod apply;
pub mod config;
pub mod domain;
pub mod extract;
pub mod fakes;
pub mod healing;
pub mod inference;
pub mod obs;
pub mod pipeline;
pub mod report;
pub mod sandbox;
pub mod stage;
pub mod telemetry;

pub use domain::{
    ApplyResult, BugCategory, ClassifiedFailure, Comparison, Failure, HealingIteration,
    HealingSession, MendError, Patch, PatchInstructions, PatchOutcome, PatchStatus,
    Recommendation, Report, Result, SessionOutcome, TestOutcome, VerificationStatus,
    VerifiedPatch,
};

pub use apply::{compare, count_failure_signals, PatchApplier};
pub use config::{CallControls, HealingConfig, InferenceConfig, MendConfig};
pub use extract::FailureExtractor;
pub use healing::{ActiveSandboxes, HealingController, HealingRequest};
pub use inference::{HttpInferenceClient, InferenceClient, InferenceError};
pub use pipeline::{PipelineOutput, PipelineStats, RemediationPipeline};
pub use report::{render_narrative, render_session, to_structured_json, CondensedReport};
pub use sandbox::{
    validate_shell_value, CommandOutput, ContainerId, Sandbox, SandboxError, SandboxHandle,
    SandboxPath, WorkDir,
};

pub use obs::{
    emit_healing_finished, emit_healing_iteration, emit_item_degraded, emit_patch_applied,
    emit_pipeline_finished, emit_pipeline_started, SessionSpan,
};
pub use telemetry::init_tracing;

/// Mend version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
