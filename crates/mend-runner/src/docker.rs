//! Sandbox backed by a running Docker container (`docker exec`).

use async_trait::async_trait;
use mend_core::sandbox::{
    CommandOutput, ContainerId, Sandbox, SandboxError, SandboxPath, SandboxResult, WorkDir,
};
use tracing::debug;

use crate::runner::{ProcessRunner, RawOutput};

/// Executes inside an existing container through the docker CLI.
///
/// Arguments are passed as argv, never through a host shell. Inside the
/// container, commands run under `sh -c`; paths are allow-listed and
/// therefore safe inside single quotes.
#[derive(Debug, Clone)]
pub struct DockerSandbox {
    docker: String,
    runner: ProcessRunner,
}

impl DockerSandbox {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            docker: "docker".to_string(),
            runner: ProcessRunner::new(timeout_secs),
        }
    }

    /// Use another docker-compatible CLI (e.g. `podman`).
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.docker = binary.to_string();
        self
    }

    async fn docker(&self, args: &[&str], stdin: Option<&str>) -> SandboxResult<CommandOutput> {
        Ok(self.docker_raw(args, stdin).await?.into_lossy())
    }

    async fn docker_raw(&self, args: &[&str], stdin: Option<&str>) -> SandboxResult<RawOutput> {
        let output = self.runner.run_raw(&self.docker, args, None, stdin).await?;
        if !output.success() {
            let stderr = output.stderr_lossy();
            if container_missing(&stderr) {
                return Err(SandboxError::Unavailable(stderr.trim().to_string()));
            }
        }
        Ok(output)
    }
}

/// Whether docker itself (not the command in the container) failed to find the target.
fn container_missing(stderr: &str) -> bool {
    stderr.contains("No such container")
        || stderr.contains("is not running")
        || stderr.contains("Cannot connect to the Docker daemon")
}

fn exec_args<'a>(container: &'a ContainerId, work_dir: &'a WorkDir, command: &'a str) -> Vec<&'a str> {
    vec![
        "exec",
        "-w",
        work_dir.as_str(),
        container.as_str(),
        "sh",
        "-c",
        command,
    ]
}

/// File contents from `cat`, refusing anything that is not valid UTF-8.
fn decode_file(path: &SandboxPath, stdout: Vec<u8>) -> SandboxResult<String> {
    String::from_utf8(stdout).map_err(|e| SandboxError::CommandFailed {
        command: format!("cat -- {}", path.as_str()),
        reason: format!("file is not valid UTF-8: {}", e.utf8_error()),
    })
}

fn write_script(path: &SandboxPath) -> String {
    format!("cat > '{}'", path.as_str())
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn execute_command(
        &self,
        container: &ContainerId,
        command: &str,
        work_dir: &WorkDir,
    ) -> SandboxResult<CommandOutput> {
        debug!(container = %container, work_dir = %work_dir, command, "docker exec");
        self.docker(&exec_args(container, work_dir, command), None).await
    }

    async fn read_file(&self, container: &ContainerId, path: &SandboxPath) -> SandboxResult<String> {
        let output = self
            .docker_raw(&["exec", container.as_str(), "cat", "--", path.as_str()], None)
            .await?;
        if !output.success() {
            return Err(SandboxError::FileNotFound(path.to_string()));
        }
        decode_file(path, output.stdout)
    }

    async fn list_files(
        &self,
        container: &ContainerId,
        path: &SandboxPath,
        max_depth: u32,
    ) -> SandboxResult<Vec<String>> {
        let depth = max_depth.to_string();
        let output = self
            .docker(
                &[
                    "exec",
                    container.as_str(),
                    "find",
                    path.as_str(),
                    "-maxdepth",
                    &depth,
                    "-type",
                    "f",
                ],
                None,
            )
            .await?;
        if !output.success() {
            return Err(SandboxError::FileNotFound(path.to_string()));
        }
        let mut files: Vec<String> = output
            .stdout
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        files.sort();
        Ok(files)
    }

    async fn write_file(
        &self,
        container: &ContainerId,
        path: &SandboxPath,
        content: &str,
    ) -> SandboxResult<()> {
        let script = write_script(path);
        let output = self
            .docker(
                &["exec", "-i", container.as_str(), "sh", "-c", &script],
                Some(content),
            )
            .await?;
        if !output.success() {
            return Err(SandboxError::CommandFailed {
                command: script,
                reason: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}
