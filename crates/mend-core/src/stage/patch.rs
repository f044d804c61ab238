//! Patch generator stage: `ClassifiedFailure` → `Patch`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{complete_with_controls, FanOutStage, StageError};
use crate::config::CallControls;
use crate::domain::{ClassifiedFailure, Patch, PatchInstructions};
use crate::inference::parse::{parse_json_response, strip_code_fences};
use crate::inference::{prompts, InferenceClient};

/// Proposes one fix per classified failure; `manual review needed` on any failure.
pub struct PatchGenerator {
    client: Arc<dyn InferenceClient>,
    controls: CallControls,
}

impl PatchGenerator {
    pub fn new(client: Arc<dyn InferenceClient>, controls: CallControls) -> Self {
        Self { client, controls }
    }
}

#[async_trait]
impl FanOutStage for PatchGenerator {
    type Input = ClassifiedFailure;
    type Output = Patch;
    const NAME: &'static str = "patch";

    async fn process(&self, classified: ClassifiedFailure) -> Result<Patch, StageError> {
        let prompt = prompts::patch_prompt(&classified);
        let response = complete_with_controls(self.client.as_ref(), &prompt, &self.controls).await?;
        let (instructions, expected) = parse_patch(&response)
            .ok_or_else(|| StageError::Malformed("no usable patch in response".to_string()))?;
        Ok(Patch::new(classified, instructions, expected))
    }

    fn sentinel(classified: ClassifiedFailure, _reason: &str) -> Patch {
        Patch::manual_review(classified)
    }
}

/// Decode a patch response into its dialect and expected observable.
///
/// Accepts the JSON forms requested by the prompt, or a single
/// `<old> → <new>` (also `->`) line. Free text is never promoted to a
/// shell command.
pub fn parse_patch(response: &str) -> Option<(PatchInstructions, String)> {
    if let Some(value) = parse_json_response(response, '{', '}').filter(|v| v.is_object()) {
        return parse_patch_json(&value);
    }
    parse_arrow_substitution(strip_code_fences(response)).map(|i| (i, String::new()))
}

fn parse_patch_json(value: &Value) -> Option<(PatchInstructions, String)> {
    let expected = value
        .get("expected")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let text = |key: &str| value.get(key).and_then(Value::as_str);

    let instructions = match text("kind")?.to_ascii_lowercase().as_str() {
        "substitution" => {
            let old = text("old").filter(|s| !s.is_empty())?;
            let new = text("new")?;
            PatchInstructions::Substitution {
                old: old.to_string(),
                new: new.to_string(),
            }
        }
        "command" => {
            let command = text("command").map(str::trim).filter(|s| !s.is_empty())?;
            PatchInstructions::Command {
                text: command.to_string(),
            }
        }
        _ => return None,
    };
    Some((instructions, expected))
}

fn parse_arrow_substitution(text: &str) -> Option<PatchInstructions> {
    if text.lines().count() != 1 {
        return None;
    }
    let (old, new) = text.split_once(" → ").or_else(|| text.split_once(" -> "))?;
    let unquote = |s: &str| s.trim().trim_matches('`').to_string();
    let old = unquote(old);
    if old.is_empty() {
        return None;
    }
    Some(PatchInstructions::Substitution {
        old,
        new: unquote(new),
    })
}
