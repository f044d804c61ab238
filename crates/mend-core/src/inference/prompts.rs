//! Prompt templates for each pipeline stage.

use crate::domain::{BugCategory, ClassifiedFailure, Failure, Patch};

/// Literal a reviewer must lead with to approve a patch.
pub const APPROVAL_TOKEN: &str = "APPROVED";
/// Literal a reviewer leads with to reject a patch.
pub const REJECTION_TOKEN: &str = "REJECTED";

/// Logs longer than this are truncated from the front before prompting;
/// test runners print their failure summaries last.
const MAX_LOG_CHARS: usize = 24_000;

pub fn extraction_prompt(logs: &str) -> String {
    let logs = tail_chars(logs, MAX_LOG_CHARS);
    format!(
        "You are analysing the output of an automated test run.\n\
         List every distinct test failure in order of first appearance.\n\
         Respond with ONLY a JSON array. Each element must be an object:\n\
         {{\"file\": \"<path of the failing source or test file>\", \
         \"line\": <line number or 0 if unknown>, \
         \"message\": \"<the error message>\"}}\n\
         Report repeated failures once per occurrence. If there are no failures, respond with [].\n\n\
         Test output:\n```\n{logs}\n```"
    )
}

pub fn classification_prompt(failure: &Failure) -> String {
    let categories = BugCategory::ALL
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Classify this test failure into exactly one category.\n\
         Allowed categories: {categories}\n\
         Respond with ONLY a JSON object: {{\"category\": \"<CATEGORY>\"}}\n\n\
         File: {}\nLine: {}\nMessage: {}",
        failure.source_file, failure.source_line, failure.message
    )
}

pub fn patch_prompt(classified: &ClassifiedFailure) -> String {
    let failure = &classified.failure;
    format!(
        "Propose a minimal fix for this failing test.\n\
         Category: {}\nFile: {}\nLine: {}\nMessage: {}\n\n\
         Respond with ONLY a JSON object in one of these forms:\n\
         {{\"kind\": \"substitution\", \"old\": \"<exact text currently in {}>\", \
         \"new\": \"<replacement text>\", \"expected\": \"<what changes in the test output>\"}}\n\
         {{\"kind\": \"command\", \"command\": \"<shell command, e.g. installing a dependency>\", \
         \"expected\": \"<what changes in the test output>\"}}\n\
         Use a substitution for code edits and a command only for environment actions.",
        classified.category,
        failure.source_file,
        failure.source_line,
        failure.message,
        failure.source_file,
    )
}

pub fn verification_prompt(patch: &Patch) -> String {
    let failure = &patch.classified.failure;
    format!(
        "Review this proposed fix before it is applied automatically.\n\
         Failure ({}) at {}: {}\n\
         Proposed change: {}\n\
         Expected effect: {}\n\n\
         Answer with the single word {APPROVAL_TOKEN} if the change is safe and likely \
         fixes the failure, or {REJECTION_TOKEN} otherwise, optionally followed by one \
         line of reasoning.",
        patch.classified.category,
        failure.location(),
        failure.message,
        patch.instructions,
        patch.expected_observable,
    )
}

fn tail_chars(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = count - max;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
