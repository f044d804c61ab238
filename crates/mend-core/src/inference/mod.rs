//! Inference collaborator: prompt in, text out.
//!
//! Every stage receives an explicit `Arc<dyn InferenceClient>` so tests can
//! substitute deterministic doubles (see [`crate::fakes`]).

pub mod http;
pub mod parse;
pub mod prompts;

use async_trait::async_trait;

pub use http::HttpInferenceClient;
pub use parse::{extract_json_fragment, strip_code_fences};

/// Errors produced by an inference backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    #[error("inference transport failed: {0}")]
    Transport(String),

    #[error("inference call timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("inference service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("inference service returned an empty completion")]
    EmptyResponse,
}

/// Text-completion service backing extraction, classification, patch
/// generation and verification.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError>;
}
