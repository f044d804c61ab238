//! Error types for the sandbox module.

/// Errors produced by the sandbox layer.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("unsafe {field} rejected: {value:?}")]
    UnsafeValue { field: &'static str, value: String },

    #[error("command `{command}` could not be executed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("command timed out after {limit_secs}s")]
    Timeout { limit_secs: u64 },

    #[error("file not found in sandbox: {0}")]
    FileNotFound(String),

    #[error("sandbox unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
