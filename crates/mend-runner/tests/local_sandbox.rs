//! Integration tests for the healing loop against a real directory.

use std::sync::Arc;

use mend_core::config::CallControls;
use mend_core::fakes::{PromptKind, Reply, ScriptedInference};
use mend_core::{
    ActiveSandboxes, HealingController, HealingRequest, PatchApplier, RemediationPipeline, SandboxHandle,
    SessionOutcome,
};
use mend_runner::LocalSandbox;

const CHECK: &str = "grep -q fixed src/status.txt || { echo 'status check failed'; exit 1; }";

fn controls() -> CallControls {
    CallControls {
        timeout_ms: 1_000,
        max_retries: 0,
        backoff_base_ms: 1,
    }
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("proj/src")).unwrap();
    std::fs::write(dir.path().join("proj/src/status.txt"), "status = broken\n").unwrap();
    dir
}

/// Test: an approved substitution fixes the file and the real test command passes
#[tokio::test]
async fn test_heal_local_project() {
    let dir = project();
    let client = ScriptedInference::new()
        .on(
            PromptKind::Extract,
            Reply::text(r#"[{"file": "src/status.txt", "line": 1, "message": "status check failed"}]"#),
        )
        .on(PromptKind::Classify, Reply::text("CONFIGURATION"))
        .on(
            PromptKind::Patch,
            Reply::text(r#"{"kind": "substitution", "old": "broken", "new": "fixed"}"#),
        )
        .on(PromptKind::Verify, Reply::text("APPROVED"));
    let sandbox = Arc::new(LocalSandbox::new(dir.path(), 30));
    let controller =
        HealingController::new(RemediationPipeline::new(Arc::new(client), controls()), sandbox)
            .with_active_sandboxes(ActiveSandboxes::new());

    let request = HealingRequest::new("status check failed", "local", "/proj", CHECK)
        .unwrap()
        .with_max_iterations(2);
    let session = controller.heal(request).await.expect("heal failed");

    assert_eq!(session.outcome, SessionOutcome::Success);
    assert_eq!(session.iteration_count(), 1);
    let content = std::fs::read_to_string(dir.path().join("proj/src/status.txt")).unwrap();
    assert_eq!(content, "status = fixed\n");
}

/// Test: a failing check exhausts the budget and records each re-run
#[tokio::test]
async fn test_heal_local_project_exhausts() {
    let dir = project();
    let client = ScriptedInference::new()
        .on(
            PromptKind::Extract,
            Reply::text(r#"[{"file": "src/status.txt", "line": 1, "message": "status check failed"}]"#),
        )
        .on(PromptKind::Classify, Reply::text("CONFIGURATION"))
        .on(
            PromptKind::Patch,
            Reply::text(r#"{"kind": "command", "command": "echo touched >> src/log.txt"}"#),
        )
        .on(PromptKind::Verify, Reply::text("APPROVED"));
    let sandbox = Arc::new(LocalSandbox::new(dir.path(), 30));
    let controller =
        HealingController::new(RemediationPipeline::new(Arc::new(client), controls()), sandbox)
            .with_active_sandboxes(ActiveSandboxes::new());

    let request = HealingRequest::new("status check failed", "local", "/proj", CHECK)
        .unwrap()
        .with_max_iterations(2);
    let session = controller.heal(request).await.unwrap();

    assert_eq!(session.outcome, SessionOutcome::Exhausted);
    assert_eq!(session.iteration_count(), 2);
    for iteration in &session.iterations {
        let tests = iteration.test_outcome.as_ref().unwrap();
        assert!(!tests.passed);
        assert!(tests.output.contains("status check failed"));
    }
    let log = std::fs::read_to_string(dir.path().join("proj/src/log.txt")).unwrap();
    assert_eq!(log.lines().count(), 2);
}

/// Test: rollback restores tracked files and removes untracked ones
#[tokio::test]
async fn test_rollback_in_git_repo() {
    let dir = project();
    let repo = dir.path().join("proj");
    let git = |args: &[&str]| {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(&repo)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    };
    git(&["init", "-q"]);
    git(&["-c", "user.name=t", "-c", "user.email=t@t", "add", "-A"]);
    git(&["-c", "user.name=t", "-c", "user.email=t@t", "commit", "-q", "-m", "init"]);

    std::fs::write(repo.join("src/status.txt"), "status = edited\n").unwrap();
    std::fs::write(repo.join("src/new.txt"), "untracked\n").unwrap();

    let applier = PatchApplier::new(Arc::new(LocalSandbox::new(dir.path(), 30)));
    let handle = SandboxHandle::new("local", "/proj").unwrap();
    applier.rollback(&handle).await.expect("rollback failed");

    let content = std::fs::read_to_string(repo.join("src/status.txt")).unwrap();
    assert_eq!(content, "status = broken\n");
    assert!(!repo.join("src/new.txt").exists());
}
