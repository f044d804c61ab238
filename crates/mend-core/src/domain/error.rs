//! Domain-level error taxonomy for Mend.

use crate::inference::InferenceError;
use crate::sandbox::SandboxError;

/// Mend domain errors.
///
/// Only input validation, extraction-level collaborator failures and
/// sandbox contention reach callers. Per-item failures inside the fan-out
/// stages are absorbed into sentinels and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum MendError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("sandbox {0} already has a healing cycle in flight")]
    SandboxBusy(String),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Mend domain operations.
pub type Result<T> = std::result::Result<T, MendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mend_error_display() {
        let err = MendError::InvalidInput("logs must not be empty".to_string());
        assert!(err.to_string().contains("invalid input"));

        let err = MendError::SandboxBusy("ctr-1".to_string());
        assert!(err.to_string().contains("ctr-1"));
        assert!(err.to_string().contains("in flight"));
    }

    #[test]
    fn test_sandbox_error_converts() {
        let err: MendError = SandboxError::UnsafeValue {
            field: "container_id",
            value: "ls; rm -rf /".to_string(),
        }
        .into();
        assert!(err.to_string().contains("container_id"));
    }

    #[test]
    fn test_collaborator_unavailable_error() {
        let err = MendError::CollaboratorUnavailable("inference timed out".to_string());
        assert!(err.to_string().contains("collaborator unavailable"));
        assert!(err.to_string().contains("inference timed out"));
    }
}
