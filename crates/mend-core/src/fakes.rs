//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `ScriptedInference`, `OfflineInference` and `MemorySandbox`,
//! which satisfy the trait contracts without a network or a container.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::inference::{InferenceClient, InferenceError};
use crate::sandbox::{
    CommandOutput, ContainerId, Sandbox, SandboxError, SandboxPath, SandboxResult, WorkDir,
};

// ---------------------------------------------------------------------------
// Prompt routing
// ---------------------------------------------------------------------------

/// Which stage a prompt was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Extract,
    Classify,
    Patch,
    Verify,
}

impl PromptKind {
    /// Recognise a prompt produced by [`crate::inference::prompts`].
    pub fn of(prompt: &str) -> Option<Self> {
        if prompt.starts_with("You are analysing the output") {
            Some(PromptKind::Extract)
        } else if prompt.starts_with("Classify this test failure") {
            Some(PromptKind::Classify)
        } else if prompt.starts_with("Propose a minimal fix") {
            Some(PromptKind::Patch)
        } else if prompt.starts_with("Review this proposed fix") {
            Some(PromptKind::Verify)
        } else {
            None
        }
    }
}

/// What a scripted rule answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(InferenceError),
    /// Never answers; exercises call timeouts.
    Hang,
    /// Panics inside the calling task.
    Panic,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    pub fn offline() -> Self {
        Reply::Fail(InferenceError::Transport("connection refused".to_string()))
    }
}

#[derive(Debug, Clone)]
struct Rule {
    kind: PromptKind,
    needle: Option<String>,
    reply: Reply,
}

// ---------------------------------------------------------------------------
// ScriptedInference
// ---------------------------------------------------------------------------

/// Inference double answering by prompt kind and content.
///
/// Rules are tried in insertion order; the first rule whose kind matches and
/// whose needle (if any) occurs in the prompt wins. Unmatched prompts get
/// the default reply, which is a transport failure unless overridden.
#[derive(Debug)]
pub struct ScriptedInference {
    rules: Vec<Rule>,
    default: Reply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedInference {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            default: Reply::offline(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every prompt of `kind` with `reply`.
    pub fn on(mut self, kind: PromptKind, reply: Reply) -> Self {
        self.rules.push(Rule {
            kind,
            needle: None,
            reply,
        });
        self
    }

    /// Answer prompts of `kind` containing `needle` with `reply`.
    pub fn on_matching(mut self, kind: PromptKind, needle: &str, reply: Reply) -> Self {
        self.rules.push(Rule {
            kind,
            needle: Some(needle.to_string()),
            reply,
        });
        self
    }

    pub fn with_default(mut self, text: &str) -> Self {
        self.default = Reply::text(text);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of prompts of `kind` received so far.
    pub fn calls_of(&self, kind: PromptKind) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| PromptKind::of(p) == Some(kind))
            .count()
    }

    fn reply_for(&self, prompt: &str) -> Reply {
        let kind = PromptKind::of(prompt);
        self.rules
            .iter()
            .find(|rule| {
                Some(rule.kind) == kind
                    && rule.needle.as_deref().map_or(true, |n| prompt.contains(n))
            })
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn complete(&self, prompt: &str) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.reply_for(prompt) {
            Reply::Text(text) => Ok(text),
            Reply::Fail(err) => Err(err),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(InferenceError::EmptyResponse)
            }
            Reply::Panic => panic!("scripted inference panic"),
        }
    }
}

// ---------------------------------------------------------------------------
// OfflineInference
// ---------------------------------------------------------------------------

/// Inference double whose every call fails at the transport level.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineInference;

#[async_trait]
impl InferenceClient for OfflineInference {
    async fn complete(&self, _prompt: &str) -> Result<String, InferenceError> {
        Err(InferenceError::Transport("connection refused".to_string()))
    }
}

// ---------------------------------------------------------------------------
// MemorySandbox
// ---------------------------------------------------------------------------

/// A call observed by [`MemorySandbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxCall {
    Execute { command: String, work_dir: String },
    Read(String),
    List(String),
    Write(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<String, String>,
    scripts: HashMap<String, VecDeque<CommandOutput>>,
    calls: Vec<SandboxCall>,
}

/// Sandbox double backed by an in-memory file map and scripted commands.
///
/// Commands not scripted succeed with empty output. A scripted command
/// consumes its queued outputs in order and keeps repeating the last one.
#[derive(Debug, Default)]
pub struct MemorySandbox {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
    unavailable: bool,
}

impl MemorySandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file at an absolute sandbox path.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
        self
    }

    /// Queue an output for an exact command string.
    pub fn on_command(self, command: &str, output: CommandOutput) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripts
            .entry(command.to_string())
            .or_default()
            .push_back(output);
        self
    }

    /// Delay every command by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every call as if the container were gone.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn calls(&self) -> Vec<SandboxCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    /// Commands executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SandboxCall::Execute { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SandboxCall) -> SandboxResult<()> {
        self.state.lock().unwrap().calls.push(call);
        if self.unavailable {
            return Err(SandboxError::Unavailable("container is not running".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Sandbox for MemorySandbox {
    async fn execute_command(
        &self,
        _container: &ContainerId,
        command: &str,
        work_dir: &WorkDir,
    ) -> SandboxResult<CommandOutput> {
        self.record(SandboxCall::Execute {
            command: command.to_string(),
            work_dir: work_dir.as_str().to_string(),
        })?;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock().unwrap();
        let output = match state.scripts.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(output.unwrap_or_else(|| CommandOutput::new("", "", 0)))
    }

    async fn read_file(&self, _container: &ContainerId, path: &SandboxPath) -> SandboxResult<String> {
        self.record(SandboxCall::Read(path.as_str().to_string()))?;
        self.state
            .lock()
            .unwrap()
            .files
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| SandboxError::FileNotFound(path.as_str().to_string()))
    }

    async fn list_files(
        &self,
        _container: &ContainerId,
        path: &SandboxPath,
        max_depth: u32,
    ) -> SandboxResult<Vec<String>> {
        self.record(SandboxCall::List(path.as_str().to_string()))?;
        let prefix = format!("{}/", path.as_str().trim_end_matches('/'));
        let state = self.state.lock().unwrap();
        let mut found: Vec<String> = state
            .files
            .keys()
            .filter_map(|file| {
                let rel = file.strip_prefix(&prefix)?;
                let depth = rel.split('/').count() as u32;
                (depth <= max_depth).then(|| file.clone())
            })
            .collect();
        found.sort();
        Ok(found)
    }

    async fn write_file(
        &self,
        _container: &ContainerId,
        path: &SandboxPath,
        content: &str,
    ) -> SandboxResult<()> {
        self.record(SandboxCall::Write(path.as_str().to_string()))?;
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.as_str().to_string(), content.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::prompts;
    use crate::domain::Failure;

    #[test]
    fn test_prompt_kind_recognises_every_stage_prompt() {
        let failure = Failure::new(0, "a.js", 1, "boom");
        assert_eq!(
            PromptKind::of(&prompts::extraction_prompt("FAIL a.js")),
            Some(PromptKind::Extract)
        );
        assert_eq!(
            PromptKind::of(&prompts::classification_prompt(&failure)),
            Some(PromptKind::Classify)
        );
        assert_eq!(PromptKind::of("hello"), None);
    }

    #[tokio::test]
    async fn test_scripted_rules_in_order() {
        let client = ScriptedInference::new()
            .on_matching(PromptKind::Classify, "boom", Reply::text("TIMEOUT"))
            .on(PromptKind::Classify, Reply::text("LOGIC_ERROR"));
        let boom = prompts::classification_prompt(&Failure::new(0, "a.js", 1, "boom"));
        let other = prompts::classification_prompt(&Failure::new(1, "b.js", 1, "other"));
        assert_eq!(client.complete(&boom).await.unwrap(), "TIMEOUT");
        assert_eq!(client.complete(&other).await.unwrap(), "LOGIC_ERROR");
        assert!(client.complete("unrelated").await.is_err());
        assert_eq!(client.call_count(), 3);
        assert_eq!(client.calls_of(PromptKind::Classify), 2);
    }

    #[tokio::test]
    async fn test_memory_sandbox_scripts_and_files() {
        let sandbox = MemorySandbox::new()
            .with_file("/app/src/a.js", "let x;")
            .with_file("/app/src/deep/b.js", "")
            .on_command("npm test", CommandOutput::new("1 failed", "", 1))
            .on_command("npm test", CommandOutput::new("ok", "", 0));
        let ctr = ContainerId::new("ctr").unwrap();
        let dir = WorkDir::new("/app").unwrap();

        assert_eq!(sandbox.execute_command(&ctr, "npm test", &dir).await.unwrap().exit_code, 1);
        assert_eq!(sandbox.execute_command(&ctr, "npm test", &dir).await.unwrap().exit_code, 0);
        assert_eq!(sandbox.execute_command(&ctr, "npm test", &dir).await.unwrap().exit_code, 0);

        let root = SandboxPath::new("/app").unwrap();
        assert_eq!(
            sandbox.list_files(&ctr, &root, 2).await.unwrap(),
            vec!["/app/src/a.js".to_string()]
        );
        assert_eq!(sandbox.list_files(&ctr, &root, 3).await.unwrap().len(), 2);

        let missing = SandboxPath::new("/app/nope.js").unwrap();
        assert!(matches!(
            sandbox.read_file(&ctr, &missing).await,
            Err(SandboxError::FileNotFound(_))
        ));
    }
}
