//! Failure extraction: raw test output → ordered [`Failure`] records.
//!
//! Extraction is the only stage without per-item granularity, so it is the
//! only place a collaborator outage can surface as an error. With rule
//! fallback enabled (the default) an unreachable inference service degrades
//! to [`rules::parse_failures`] instead.

pub mod rules;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CallControls;
use crate::domain::{Failure, MendError, Result};
use crate::inference::parse::parse_json_response;
use crate::inference::{prompts, InferenceClient};
use crate::stage::complete_with_controls;

/// Turns log text into failures via inference, with an optional rule-based fallback.
pub struct FailureExtractor {
    client: Arc<dyn InferenceClient>,
    controls: CallControls,
    rule_fallback: bool,
}

impl FailureExtractor {
    pub fn new(client: Arc<dyn InferenceClient>, controls: CallControls) -> Self {
        Self {
            client,
            controls,
            rule_fallback: true,
        }
    }

    /// Enable or disable the rule-based parser used when inference is unreachable.
    pub fn with_rule_fallback(mut self, enabled: bool) -> Self {
        self.rule_fallback = enabled;
        self
    }

    /// Extract failures in order of first appearance.
    ///
    /// A malformed inference response yields an empty list. Only empty
    /// input, or an unreachable service with fallback disabled, is an error.
    pub async fn extract(&self, logs: &str) -> Result<Vec<Failure>> {
        if logs.trim().is_empty() {
            return Err(MendError::InvalidInput("logs must not be empty".to_string()));
        }

        let prompt = prompts::extraction_prompt(logs);
        match complete_with_controls(self.client.as_ref(), &prompt, &self.controls).await {
            Ok(response) => match parse_failures(&response) {
                Some(failures) => {
                    debug!(count = failures.len(), "extracted failures");
                    Ok(failures)
                }
                None => {
                    warn!("extraction response failed validation; treating as no failures");
                    Ok(Vec::new())
                }
            },
            Err(err) if self.rule_fallback => {
                warn!(error = %err, "inference unavailable for extraction; using log rules");
                Ok(rules::parse_failures(logs))
            }
            Err(err) => Err(MendError::CollaboratorUnavailable(format!(
                "failure extraction: {err}"
            ))),
        }
    }
}

/// Strictly decode an extraction response.
///
/// Returns `None` when the response is not a JSON array of
/// `{file, line, message}` objects; one bad element discards the lot.
pub fn parse_failures(response: &str) -> Option<Vec<Failure>> {
    let value = parse_json_response(response, '[', ']')?;
    let items = value.as_array()?;
    items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_failure(index, item))
        .collect()
}

fn parse_failure(index: usize, item: &Value) -> Option<Failure> {
    let obj = item.as_object()?;
    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    let file = text("file")?;
    let message = text("message")?;
    let line = match obj.get("line") {
        None | Some(Value::Null) => 0,
        Some(v) => u32::try_from(v.as_u64()?).ok()?,
    };
    Some(Failure::new(index, file, line, message))
}
