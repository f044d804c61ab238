//! Sandbox backed by a directory on the host.
//!
//! Sandbox paths are resolved under `root`, so `/app/src/a.js` with root
//! `/tmp/x` is `/tmp/x/app/src/a.js`. A root of `/` maps paths one to one.
//! The container id only labels log lines.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use mend_core::sandbox::{
    CommandOutput, ContainerId, Sandbox, SandboxError, SandboxPath, SandboxResult, WorkDir,
};
use tracing::debug;

use crate::runner::ProcessRunner;

#[derive(Debug, Clone)]
pub struct LocalSandbox {
    root: PathBuf,
    runner: ProcessRunner,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            root: root.into(),
            runner: ProcessRunner::new(timeout_secs),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a sandbox path under `root`, refusing `..` components.
    fn resolve(&self, field: &'static str, sandbox_path: &str) -> SandboxResult<PathBuf> {
        let relative = Path::new(sandbox_path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(SandboxError::UnsafeValue {
                        field,
                        value: sandbox_path.to_string(),
                    })
                }
            }
        }
        Ok(resolved)
    }

    /// Inverse of [`resolve`](Self::resolve) for paths found on disk.
    fn to_sandbox_path(&self, host: &Path) -> String {
        let relative = host.strip_prefix(&self.root).unwrap_or(host);
        format!("/{}", relative.to_string_lossy())
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn execute_command(
        &self,
        container: &ContainerId,
        command: &str,
        work_dir: &WorkDir,
    ) -> SandboxResult<CommandOutput> {
        let dir = self.resolve("work_dir", work_dir.as_str())?;
        if !tokio::fs::try_exists(&dir).await? {
            return Err(SandboxError::FileNotFound(work_dir.to_string()));
        }
        debug!(container = %container, dir = %dir.display(), command, "local exec");
        self.runner
            .run("sh", &["-c", command], Some(&dir), None)
            .await
    }

    async fn read_file(&self, _container: &ContainerId, path: &SandboxPath) -> SandboxResult<String> {
        let host = self.resolve("path", path.as_str())?;
        tokio::fs::read_to_string(&host).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SandboxError::FileNotFound(path.to_string()),
            _ => SandboxError::Io(e),
        })
    }

    async fn list_files(
        &self,
        _container: &ContainerId,
        path: &SandboxPath,
        max_depth: u32,
    ) -> SandboxResult<Vec<String>> {
        let start = self.resolve("path", path.as_str())?;
        if !tokio::fs::try_exists(&start).await? {
            return Err(SandboxError::FileNotFound(path.to_string()));
        }

        let mut files = Vec::new();
        let mut pending = vec![(start, 0u32)];
        while let Some((dir, depth)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if depth + 1 < max_depth {
                        pending.push((entry.path(), depth + 1));
                    }
                } else if depth < max_depth {
                    files.push(self.to_sandbox_path(&entry.path()));
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn write_file(
        &self,
        _container: &ContainerId,
        path: &SandboxPath,
        content: &str,
    ) -> SandboxResult<()> {
        let host = self.resolve("path", path.as_str())?;
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&host, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (ContainerId, WorkDir) {
        (ContainerId::new("local").unwrap(), WorkDir::new("/proj").unwrap())
    }

    #[test]
    fn test_resolve_under_root() {
        let sandbox = LocalSandbox::new("/tmp/root", 5);
        assert_eq!(
            sandbox.resolve("path", "/proj/src/a.js").unwrap(),
            PathBuf::from("/tmp/root/proj/src/a.js")
        );
        assert!(sandbox.resolve("path", "/proj/../../etc/passwd").is_err());
    }

    #[tokio::test]
    async fn test_write_read_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path(), 5);
        let (ctr, _) = ids();

        let path = SandboxPath::new("/proj/src/a.js").unwrap();
        sandbox.write_file(&ctr, &path, "let a = 1;\n").await.unwrap();
        assert_eq!(sandbox.read_file(&ctr, &path).await.unwrap(), "let a = 1;\n");

        let nested = SandboxPath::new("/proj/src/deep/b.js").unwrap();
        sandbox.write_file(&ctr, &nested, "").await.unwrap();

        let root = SandboxPath::new("/proj").unwrap();
        assert_eq!(
            sandbox.list_files(&ctr, &root, 2).await.unwrap(),
            vec!["/proj/src/a.js".to_string()]
        );
        assert_eq!(
            sandbox.list_files(&ctr, &root, 3).await.unwrap(),
            vec!["/proj/src/a.js".to_string(), "/proj/src/deep/b.js".to_string()]
        );
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = LocalSandbox::new(dir.path(), 5);
        let (ctr, _) = ids();
        let err = sandbox
            .read_file(&ctr, &SandboxPath::new("/proj/none.js").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_execute_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("proj")).unwrap();
        let sandbox = LocalSandbox::new(dir.path(), 5);
        let (ctr, work_dir) = ids();
        let output = sandbox
            .execute_command(&ctr, "echo hi > out.txt && cat out.txt && exit 3", &work_dir)
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "hi");
        assert!(dir.path().join("proj/out.txt").exists());
    }
}
