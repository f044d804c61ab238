//! Allow-list validation for values that end up in a shell invocation.
//!
//! Container ids, work directories and file paths are attacker-influenceable
//! (they come from request payloads and from log text). Anything outside
//! `[A-Za-z0-9_\-./:\[\] ]` is rejected before a sandbox call is made. The
//! allow-list contains no quote characters, so validated values are safe
//! inside single quotes.

use serde::{Deserialize, Serialize};

use super::error::{SandboxError, SandboxResult};

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '[' | ']' | ' ')
}

/// Check `value` against the shell allow-list.
///
/// Empty values are rejected as well.
pub fn validate_shell_value<'a>(field: &'static str, value: &'a str) -> SandboxResult<&'a str> {
    if value.is_empty() || !value.chars().all(is_allowed) {
        return Err(SandboxError::UnsafeValue {
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// Validated container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(value: &str) -> SandboxResult<Self> {
        validate_shell_value("container_id", value)?;
        // A leading dash would be read as an option by `docker exec`.
        if value.starts_with('-') {
            return Err(SandboxError::UnsafeValue {
                field: "container_id",
                value: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validated working directory inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkDir(String);

impl WorkDir {
    pub fn new(value: &str) -> SandboxResult<Self> {
        validate_shell_value("work_dir", value)?;
        let trimmed = value.trim_end_matches('/');
        let dir = if trimmed.is_empty() { "/" } else { trimmed };
        Ok(Self(dir.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve `relative` against this directory and validate the result.
    ///
    /// Absolute paths are taken as-is.
    pub fn join(&self, relative: &str) -> SandboxResult<SandboxPath> {
        if relative.starts_with('/') {
            return SandboxPath::new(relative);
        }
        let relative = relative.trim_start_matches("./");
        let joined = if self.0 == "/" {
            format!("/{relative}")
        } else {
            format!("{}/{relative}", self.0)
        };
        SandboxPath::new(&joined)
    }
}

/// Validated file or directory path inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SandboxPath(String);

impl SandboxPath {
    pub fn new(value: &str) -> SandboxResult<Self> {
        validate_shell_value("path", value)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

macro_rules! string_newtype_conversions {
    ($($ty:ident),*) => {$(
        impl TryFrom<String> for $ty {
            type Error = SandboxError;
            fn try_from(value: String) -> SandboxResult<Self> {
                Self::new(&value)
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> String {
                value.0
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    )*};
}

string_newtype_conversions!(ContainerId, WorkDir, SandboxPath);
