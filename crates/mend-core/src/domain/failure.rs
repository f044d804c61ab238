//! Failure records and their classification.

use serde::{Deserialize, Serialize};

/// A discrete test failure extracted from raw log text.
///
/// Identical failures are kept as separate records; each occurrence in the
/// log is its own item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub id: String,
    pub source_file: String,
    /// 1-based line number, 0 when unknown.
    pub source_line: u32,
    pub message: String,
}

impl Failure {
    pub fn new(
        index: usize,
        source_file: impl Into<String>,
        source_line: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("failure-{}", index + 1),
            source_file: source_file.into(),
            source_line,
            message: message.into(),
        }
    }

    /// `file:line`, or just `file` when the line is unknown.
    pub fn location(&self) -> String {
        if self.source_line == 0 {
            self.source_file.clone()
        } else {
            format!("{}:{}", self.source_file, self.source_line)
        }
    }
}

/// Closed set of bug categories a failure can be assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BugCategory {
    SyntaxError,
    TypeError,
    ReferenceError,
    AssertionFailure,
    MissingDependency,
    Timeout,
    Configuration,
    LogicError,
    Unknown,
}

impl BugCategory {
    pub const ALL: [BugCategory; 9] = [
        BugCategory::SyntaxError,
        BugCategory::TypeError,
        BugCategory::ReferenceError,
        BugCategory::AssertionFailure,
        BugCategory::MissingDependency,
        BugCategory::Timeout,
        BugCategory::Configuration,
        BugCategory::LogicError,
        BugCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BugCategory::SyntaxError => "SYNTAX_ERROR",
            BugCategory::TypeError => "TYPE_ERROR",
            BugCategory::ReferenceError => "REFERENCE_ERROR",
            BugCategory::AssertionFailure => "ASSERTION_FAILURE",
            BugCategory::MissingDependency => "MISSING_DEPENDENCY",
            BugCategory::Timeout => "TIMEOUT",
            BugCategory::Configuration => "CONFIGURATION",
            BugCategory::LogicError => "LOGIC_ERROR",
            BugCategory::Unknown => "UNKNOWN",
        }
    }

    /// Match a free-form token against the closed set.
    ///
    /// Case, spaces, dashes and underscores are ignored, so `TypeError`,
    /// `type_error` and `TYPE-ERROR` all resolve to [`BugCategory::TypeError`].
    pub fn parse_token(token: &str) -> Option<Self> {
        let wanted: String = token
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if wanted.is_empty() {
            return None;
        }
        Self::ALL.into_iter().find(|category| {
            let name: String = category.as_str().chars().filter(|c| *c != '_').collect();
            name == wanted
        })
    }
}

impl std::fmt::Display for BugCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`Failure`] paired with its category. One-to-one with the input failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedFailure {
    pub failure: Failure,
    pub category: BugCategory,
}

impl ClassifiedFailure {
    pub fn new(failure: Failure, category: BugCategory) -> Self {
        Self { failure, category }
    }

    /// Sentinel used when classification could not produce a result.
    pub fn unknown(failure: Failure) -> Self {
        Self::new(failure, BugCategory::Unknown)
    }
}
