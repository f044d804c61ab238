//! Sandbox: the narrow command/file interface Mend consumes.
//!
//! # Modules
//!
//! - [`executor`]: `Sandbox` trait, `CommandOutput`, `SandboxHandle`
//! - [`validate`]: allow-list validation and the `ContainerId` / `WorkDir` / `SandboxPath` newtypes
//! - [`error`]: `SandboxError` / `SandboxResult`
//!
//! Process-backed implementations live in the `mend-runner` crate; an
//! in-memory fake lives in [`crate::fakes`].

pub mod error;
pub mod executor;
pub mod validate;

pub use error::{SandboxError, SandboxResult};
pub use executor::{CommandOutput, Sandbox, SandboxHandle};
pub use validate::{validate_shell_value, ContainerId, SandboxPath, WorkDir};
