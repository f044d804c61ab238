//! Runtime configuration.
//!
//! Every section has working defaults and can be overridden from the
//! environment (`MEND_*` variables) via [`MendConfig::from_env`].

use serde::{Deserialize, Serialize};

/// Default number of healing iterations.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Inference service connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    pub model: String,
    /// Bearer token (optional for local gateways).
    pub api_key: Option<String>,
    pub max_tokens: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: env_or("MEND_INFERENCE_URL", "https://openrouter.ai/api/v1"),
            model: env_or("MEND_INFERENCE_MODEL", "openai/gpt-4o-mini"),
            api_key: std::env::var("MEND_INFERENCE_API_KEY").ok(),
            max_tokens: env_parse("MEND_INFERENCE_MAX_TOKENS", 2048),
        }
    }
}

impl InferenceConfig {
    /// Create config for a specific endpoint.
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key: None,
            max_tokens: 2048,
        }
    }

    /// Set authentication token
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }
}

/// Per-call controls applied to every collaborator call made by a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallControls {
    /// Maximum wall-clock time for a single attempt (milliseconds).
    pub timeout_ms: u64,
    /// Maximum number of retries (0 = run once).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries (milliseconds).
    pub backoff_base_ms: u64,
}

impl Default for CallControls {
    fn default() -> Self {
        Self {
            timeout_ms: env_parse("MEND_CALL_TIMEOUT_MS", 60_000),
            max_retries: env_parse("MEND_CALL_RETRIES", 1),
            backoff_base_ms: env_parse("MEND_BACKOFF_BASE_MS", 250),
        }
    }
}

/// Healing loop and patch application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingConfig {
    pub max_iterations: u32,
    /// Commit the working tree when an iteration improves the failure count.
    pub commit_on_improvement: bool,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            max_iterations: env_parse("MEND_MAX_ITERATIONS", DEFAULT_MAX_ITERATIONS),
            commit_on_improvement: env_parse("MEND_COMMIT_ON_IMPROVEMENT", false),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MendConfig {
    pub inference: InferenceConfig,
    pub controls: CallControls,
    pub healing: HealingConfig,
    /// Timeout for sandbox commands, including the test command (seconds).
    pub command_timeout_secs: u64,
    /// Fall back to rule-based log parsing when extraction inference fails.
    pub rule_fallback: bool,
}

impl Default for MendConfig {
    fn default() -> Self {
        Self {
            inference: InferenceConfig::default(),
            controls: CallControls::default(),
            healing: HealingConfig::default(),
            command_timeout_secs: env_parse("MEND_COMMAND_TIMEOUT_SECS", 600),
            rule_fallback: env_parse("MEND_RULE_FALLBACK", true),
        }
    }
}

impl MendConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        assert_eq!(env_parse("MEND_TEST_UNSET_VARIABLE_XYZ", 7u32), 7);
    }

    #[test]
    fn test_inference_config_builder() {
        let cfg = InferenceConfig::new("http://localhost:8080/v1", "local-model").with_api_key("k");
        assert_eq!(cfg.base_url, "http://localhost:8080/v1");
        assert_eq!(cfg.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let cfg = MendConfig {
            inference: InferenceConfig::new("http://localhost/v1", "m"),
            controls: CallControls {
                timeout_ms: 5000,
                max_retries: 0,
                backoff_base_ms: 10,
            },
            healing: HealingConfig {
                max_iterations: 3,
                commit_on_improvement: true,
            },
            command_timeout_secs: 30,
            rule_fallback: false,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: MendConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
