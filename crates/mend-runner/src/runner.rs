//! Child process execution with a wall-clock limit.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use mend_core::sandbox::{CommandOutput, SandboxError, SandboxResult};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::debug;

/// Captured output before any text decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl RawOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Decode both streams, replacing invalid UTF-8.
    pub fn into_lossy(self) -> CommandOutput {
        CommandOutput::new(
            String::from_utf8_lossy(&self.stdout),
            String::from_utf8_lossy(&self.stderr),
            self.exit_code,
        )
    }
}

/// Runs programs directly (no host shell) and captures their output.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    /// 0 disables the limit.
    timeout_secs: u64,
}

impl ProcessRunner {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Run `program` with `args`, optionally in `cwd` and feeding `stdin`.
    ///
    /// A non-zero exit is returned as output. A missing program is
    /// `Unavailable`; exceeding the limit kills the child and is `Timeout`.
    pub async fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        stdin: Option<&str>,
    ) -> SandboxResult<CommandOutput> {
        Ok(self.run_raw(program, args, cwd, stdin).await?.into_lossy())
    }

    /// Like [`run`](Self::run) but leaves stdout and stderr as bytes.
    ///
    /// The stdin write counts against the limit. If the child stops reading
    /// early, its output is still collected so callers can classify the exit.
    pub async fn run_raw(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        stdin: Option<&str>,
    ) -> SandboxResult<RawOutput> {
        let start = Instant::now();

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                SandboxError::Unavailable(format!("{program} is not installed"))
            }
            _ => SandboxError::Io(e),
        })?;

        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(self.timeout_secs), interact(child, stdin))
                .await
                .map_err(|_| SandboxError::Timeout {
                    limit_secs: self.timeout_secs,
                })??
        } else {
            interact(child, stdin).await?
        };

        debug!(
            program,
            exit_code = output.exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "process finished"
        );
        Ok(output)
    }
}

/// Feed stdin, then wait for exit.
///
/// A failed write only surfaces as an error when the child still exits 0;
/// otherwise the exit status and stderr describe the failure better.
async fn interact(mut child: Child, stdin: Option<&str>) -> SandboxResult<RawOutput> {
    let mut write_error = None;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let written = match pipe.write_all(input.as_bytes()).await {
            Ok(()) => pipe.shutdown().await,
            Err(e) => Err(e),
        };
        drop(pipe);
        if let Err(e) = written {
            debug!(error = %e, "stdin write failed");
            write_error = Some(e);
        }
    }

    let output = child.wait_with_output().await?;
    let exit_code = output.status.code().unwrap_or(-1);
    match write_error {
        Some(e) if exit_code == 0 => Err(SandboxError::Io(e)),
        _ => Ok(RawOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_simple_command() {
        let output = ProcessRunner::new(60)
            .run("echo", &["hello"], None, None)
            .await
            .expect("execute failed");
        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_failing_command() {
        let output = ProcessRunner::new(60)
            .run("false", &[], None, None)
            .await
            .expect("execute failed");
        assert!(!output.success());
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_stdin_is_fed() {
        let output = ProcessRunner::new(60)
            .run("cat", &[], None, Some("piped content"))
            .await
            .unwrap();
        assert_eq!(output.stdout, "piped content");
    }

    #[tokio::test]
    async fn test_raw_output_keeps_invalid_utf8() {
        let output = ProcessRunner::new(60)
            .run_raw("printf", &["a\\377b"], None, None)
            .await
            .unwrap();
        assert_eq!(output.stdout, vec![b'a', 0xff, b'b']);
        assert_eq!(output.into_lossy().stdout, "a\u{fffd}b");
    }

    #[tokio::test]
    async fn test_child_ignoring_stdin_still_reports_exit() {
        let input = "x".repeat(1 << 20);
        let output = ProcessRunner::new(10)
            .run("sh", &["-c", "echo gone >&2; exit 3"], None, Some(&input))
            .await
            .expect("exit should be reported, not the broken pipe");
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr.trim(), "gone");
    }

    #[tokio::test]
    async fn test_stdin_write_counts_against_timeout() {
        let input = "x".repeat(1 << 20);
        let err = ProcessRunner::new(1)
            .run("sleep", &["5"], None, Some(&input))
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { limit_secs: 1 }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = ProcessRunner::new(1)
            .run("sleep", &["5"], None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { limit_secs: 1 }));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let err = ProcessRunner::new(5)
            .run("mend-definitely-not-a-program", &[], None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Unavailable(_)));
    }
}
