//! Classifier stage: `Failure` → `ClassifiedFailure`.

use std::sync::Arc;

use async_trait::async_trait;

use super::{complete_with_controls, FanOutStage, StageError};
use crate::config::CallControls;
use crate::domain::{BugCategory, ClassifiedFailure, Failure};
use crate::inference::parse::{parse_json_response, strip_code_fences};
use crate::inference::{prompts, InferenceClient};

/// Assigns each failure one [`BugCategory`]; `UNKNOWN` on any failure.
pub struct Classifier {
    client: Arc<dyn InferenceClient>,
    controls: CallControls,
}

impl Classifier {
    pub fn new(client: Arc<dyn InferenceClient>, controls: CallControls) -> Self {
        Self { client, controls }
    }
}

#[async_trait]
impl FanOutStage for Classifier {
    type Input = Failure;
    type Output = ClassifiedFailure;
    const NAME: &'static str = "classify";

    async fn process(&self, failure: Failure) -> Result<ClassifiedFailure, StageError> {
        let prompt = prompts::classification_prompt(&failure);
        let response = complete_with_controls(self.client.as_ref(), &prompt, &self.controls).await?;
        let category = parse_category(&response)
            .ok_or_else(|| StageError::Malformed(format!("no known category in {response:?}")))?;
        Ok(ClassifiedFailure::new(failure, category))
    }

    fn sentinel(failure: Failure, _reason: &str) -> ClassifiedFailure {
        ClassifiedFailure::unknown(failure)
    }
}

/// Read a category from `{"category": "..."}` or a bare token.
pub fn parse_category(response: &str) -> Option<BugCategory> {
    if let Some(value) = parse_json_response(response, '{', '}').filter(|v| v.is_object()) {
        return value
            .get("category")
            .and_then(|c| c.as_str())
            .and_then(BugCategory::parse_token);
    }
    let bare = strip_code_fences(response).trim_matches(|c: char| c == '"' || c == '.');
    if bare.lines().count() != 1 {
        return None;
    }
    BugCategory::parse_token(bare)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category_json() {
        assert_eq!(
            parse_category(r#"{"category": "REFERENCE_ERROR"}"#),
            Some(BugCategory::ReferenceError)
        );
        assert_eq!(
            parse_category("```json\n{\"category\": \"timeout\"}\n```"),
            Some(BugCategory::Timeout)
        );
    }

    #[test]
    fn test_parse_category_bare_token() {
        assert_eq!(parse_category("TYPE_ERROR"), Some(BugCategory::TypeError));
        assert_eq!(parse_category("\"SyntaxError\"."), Some(BugCategory::SyntaxError));
        assert_eq!(parse_category("\"LOGIC_ERROR\""), Some(BugCategory::LogicError));
    }

    #[test]
    fn test_parse_category_rejects_unknown_and_prose() {
        assert_eq!(parse_category(r#"{"category": "GREMLINS"}"#), None);
        assert_eq!(parse_category(r#"{"kind": "TYPE_ERROR"}"#), None);
        assert_eq!(parse_category("I think this is probably a type error"), None);
        assert_eq!(parse_category(""), None);
    }

    #[test]
    fn test_sentinel_is_unknown() {
        let failure = Failure::new(0, "a.js", 1, "boom");
        let classified = Classifier::sentinel(failure.clone(), "offline");
        assert_eq!(classified.category, BugCategory::Unknown);
        assert_eq!(classified.failure, failure);
    }
}
