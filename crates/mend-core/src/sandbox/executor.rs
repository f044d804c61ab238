//! The sandbox collaborator interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::SandboxResult;
use super::validate::{ContainerId, SandboxPath, WorkDir};

/// Captured result of a command run inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, separated by a newline when both are present.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Isolated execution environment hosting the code under test.
///
/// Every argument that reaches an implementation has already passed the
/// allow-list in [`super::validate`]; the newtypes cannot be built otherwise.
/// Sandbox lifecycle (creation, cloning, dependency installation) is not
/// part of this interface.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run `command` through a shell in `work_dir`.
    ///
    /// A non-zero exit code is a normal result, not an error. Errors mean
    /// the command could not be run at all.
    async fn execute_command(
        &self,
        container: &ContainerId,
        command: &str,
        work_dir: &WorkDir,
    ) -> SandboxResult<CommandOutput>;

    async fn read_file(&self, container: &ContainerId, path: &SandboxPath) -> SandboxResult<String>;

    async fn list_files(
        &self,
        container: &ContainerId,
        path: &SandboxPath,
        max_depth: u32,
    ) -> SandboxResult<Vec<String>>;

    /// Replace the content of `path`. Content never passes through a shell.
    async fn write_file(
        &self,
        container: &ContainerId,
        path: &SandboxPath,
        content: &str,
    ) -> SandboxResult<()>;
}

/// A validated (container, work dir) pair the engine acts on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SandboxHandle {
    pub container: ContainerId,
    pub work_dir: WorkDir,
}

impl SandboxHandle {
    pub fn new(container_id: &str, work_dir: &str) -> SandboxResult<Self> {
        Ok(Self {
            container: ContainerId::new(container_id)?,
            work_dir: WorkDir::new(work_dir)?,
        })
    }

    /// Key used to serialise healing cycles per sandbox.
    pub fn key(&self) -> &str {
        self.container.as_str()
    }
}
