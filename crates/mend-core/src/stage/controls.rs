//! Execution controls for collaborator calls: timeout and retry with
//! exponential backoff.

use std::time::Duration;

use tracing::debug;

use crate::config::CallControls;
use crate::inference::{InferenceClient, InferenceError};

/// Call `client.complete(prompt)` under `controls`.
///
/// Each attempt is bounded by `timeout_ms`. Failed or timed-out attempts
/// are retried up to `max_retries` times, sleeping
/// `backoff_base_ms * 2^(attempt-1)` in between. The last error is returned
/// once attempts run out.
pub async fn complete_with_controls(
    client: &dyn InferenceClient,
    prompt: &str,
    controls: &CallControls,
) -> Result<String, InferenceError> {
    let max_attempts = controls.max_retries + 1;
    let timeout = Duration::from_millis(controls.timeout_ms);
    let mut last_error = InferenceError::EmptyResponse;

    for attempt in 1..=max_attempts {
        match tokio::time::timeout(timeout, client.complete(prompt)).await {
            Ok(Ok(text)) => return Ok(text),
            Ok(Err(err)) => {
                debug!(attempt, error = %err, "inference attempt failed");
                last_error = err;
            }
            Err(_elapsed) => {
                debug!(attempt, limit_ms = controls.timeout_ms, "inference attempt timed out");
                last_error = InferenceError::Timeout {
                    limit_ms: controls.timeout_ms,
                };
            }
        }

        if attempt < max_attempts {
            let delay = controls
                .backoff_base_ms
                .saturating_mul(2u64.saturating_pow(attempt - 1));
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl InferenceClient for Flaky {
        async fn complete(&self, _prompt: &str) -> Result<String, InferenceError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed);
            if n < self.failures_before_success {
                Err(InferenceError::Transport("not yet".into()))
            } else {
                Ok("ok".into())
            }
        }
    }

    struct Hanging;

    #[async_trait]
    impl InferenceClient for Hanging {
        async fn complete(&self, _prompt: &str) -> Result<String, InferenceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("too late".into())
        }
    }

    fn controls(max_retries: u32) -> CallControls {
        CallControls {
            timeout_ms: 50,
            max_retries,
            backoff_base_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let client = Flaky {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
        };
        let text = complete_with_controls(&client, "p", &controls(2)).await.unwrap();
        assert_eq!(text, "ok");
        assert_eq!(client.calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_exhausts_retries() {
        let client = Flaky {
            failures_before_success: 10,
            calls: AtomicU32::new(0),
        };
        let err = complete_with_controls(&client, "p", &controls(1)).await.unwrap_err();
        assert!(matches!(err, InferenceError::Transport(_)));
        assert_eq!(client.calls.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_timeout_becomes_error() {
        let err = complete_with_controls(&Hanging, "p", &controls(0)).await.unwrap_err();
        assert_eq!(err, InferenceError::Timeout { limit_ms: 50 });
    }
}
