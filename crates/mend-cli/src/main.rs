//! Mend - automated triage and remediation of failing test suites
//!
//! ## Commands
//!
//! - `analyze`: Run the remediation pipeline over a saved test log
//! - `heal`: Run the bounded apply / re-test loop against a sandbox
//! - `rollback`: Discard uncommitted changes in a sandbox work dir

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};

use mend_core::report::{render_narrative, render_session, to_structured_json, CondensedReport};
use mend_core::telemetry::level_for;
use mend_core::{
    HealingController, HealingRequest, HttpInferenceClient, MendConfig, PatchApplier,
    RemediationPipeline, Sandbox, SandboxHandle, SessionOutcome,
};
use mend_runner::{DockerSandbox, LocalSandbox};

#[derive(Parser)]
#[command(name = "mend")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Triage and remediate failing test suites", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Base URL of an OpenAI-compatible inference API
    #[arg(long, global = true, env = "MEND_INFERENCE_URL")]
    inference_url: Option<String>,

    /// Model name sent to the inference API
    #[arg(long, global = true, env = "MEND_INFERENCE_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, classify, patch and verify failures from a test log
    Analyze {
        /// Path to the captured test output
        #[arg(short, long)]
        logs: PathBuf,

        /// Report projection to print
        #[arg(short, long, value_enum, default_value = "narrative")]
        format: ReportFormat,
    },

    /// Apply approved fixes and re-run tests until they pass or the budget runs out
    Heal {
        /// Container id (or a label when --local)
        #[arg(long)]
        container: String,

        /// Working directory inside the sandbox
        #[arg(long)]
        work_dir: String,

        /// Command that runs the test suite
        #[arg(long)]
        test_command: String,

        /// Initial test output (runs the test command when omitted)
        #[arg(long)]
        logs: Option<PathBuf>,

        /// Iteration budget
        #[arg(long, env = "MEND_MAX_ITERATIONS")]
        max_iterations: Option<u32>,

        /// Run against the host filesystem instead of docker
        #[arg(long)]
        local: bool,

        /// Commit the work tree after an iteration that reduces failures
        #[arg(long)]
        commit: bool,

        /// Print the session as JSON instead of text
        #[arg(long)]
        json_output: bool,
    },

    /// Discard uncommitted changes in the sandbox work dir
    Rollback {
        /// Container id (or a label when --local)
        #[arg(long)]
        container: String,

        /// Working directory inside the sandbox
        #[arg(long)]
        work_dir: String,

        /// Run against the host filesystem instead of docker
        #[arg(long)]
        local: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Narrative,
    Json,
    Condensed,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    mend_core::init_tracing(cli.json, level_for(cli.verbose));

    let mut config = MendConfig::from_env();
    if let Some(url) = &cli.inference_url {
        config.inference.base_url = url.clone();
    }
    if let Some(model) = &cli.model {
        config.inference.model = model.clone();
    }

    match cli.command {
        Commands::Analyze { logs, format } => cmd_analyze(&config, &logs, format).await,
        Commands::Heal {
            container,
            work_dir,
            test_command,
            logs,
            max_iterations,
            local,
            commit,
            json_output,
        } => {
            if let Some(n) = max_iterations {
                config.healing.max_iterations = n;
            }
            if commit {
                config.healing.commit_on_improvement = true;
            }
            cmd_heal(
                &config,
                &container,
                &work_dir,
                &test_command,
                logs.as_deref(),
                local,
                json_output,
            )
            .await
        }
        Commands::Rollback {
            container,
            work_dir,
            local,
        } => cmd_rollback(&config, &container, &work_dir, local).await,
    }
}

fn build_pipeline(config: &MendConfig) -> Result<RemediationPipeline> {
    let client = HttpInferenceClient::new(config.inference.clone())
        .context("Failed to build inference client")?;
    Ok(RemediationPipeline::from_config(Arc::new(client), config))
}

fn build_sandbox(config: &MendConfig, local: bool) -> Arc<dyn Sandbox> {
    if local {
        Arc::new(LocalSandbox::new("/", config.command_timeout_secs))
    } else {
        Arc::new(DockerSandbox::new(config.command_timeout_secs))
    }
}

fn read_logs(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read logs from {:?}", path))
}

async fn cmd_analyze(config: &MendConfig, logs: &Path, format: ReportFormat) -> Result<()> {
    let text = read_logs(logs)?;
    let pipeline = build_pipeline(config)?;
    let output = pipeline
        .run_with_stats(&text)
        .await
        .context("Remediation pipeline failed")?;

    let rendered = match format {
        ReportFormat::Narrative => render_narrative(&output.report),
        ReportFormat::Json => to_structured_json(&output.report)?,
        ReportFormat::Condensed => CondensedReport::from_report(&output.report).render(),
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

async fn cmd_heal(
    config: &MendConfig,
    container: &str,
    work_dir: &str,
    test_command: &str,
    logs: Option<&Path>,
    local: bool,
    json_output: bool,
) -> Result<()> {
    let handle = SandboxHandle::new(container, work_dir).context("Invalid sandbox")?;
    let sandbox = build_sandbox(config, local);

    let initial_logs = match logs {
        Some(path) => read_logs(path)?,
        None => {
            info!("No logs given; running the test command first");
            let outcome = PatchApplier::new(Arc::clone(&sandbox))
                .run_tests(&handle, test_command)
                .await
                .context("Failed to run tests")?;
            if outcome.passed {
                println!("Tests already pass; nothing to heal.");
                return Ok(());
            }
            outcome.output
        }
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current iteration");
            cancel_tx.send(true).ok();
        }
    });

    let controller = HealingController::new(build_pipeline(config)?, sandbox)
        .with_config(&config.healing)
        .with_cancellation(cancel_rx);
    let request = HealingRequest::new(initial_logs, container, work_dir, test_command)?
        .with_max_iterations(config.healing.max_iterations);
    let session = controller.heal(request).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        println!("{}", render_session(&session).trim_end());
    }

    match session.outcome {
        SessionOutcome::Success => Ok(()),
        outcome => anyhow::bail!("Healing ended without passing tests: {}", outcome),
    }
}

async fn cmd_rollback(config: &MendConfig, container: &str, work_dir: &str, local: bool) -> Result<()> {
    let handle = SandboxHandle::new(container, work_dir).context("Invalid sandbox")?;
    PatchApplier::new(build_sandbox(config, local))
        .rollback(&handle)
        .await
        .context("Rollback failed")?;
    println!("Rolled back uncommitted changes in {}:{}", container, work_dir);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze_defaults() {
        let cli = Cli::try_parse_from(["mend", "analyze", "--logs", "out.log"]).unwrap();
        match cli.command {
            Commands::Analyze { logs, format } => {
                assert_eq!(logs, PathBuf::from("out.log"));
                assert_eq!(format, ReportFormat::Narrative);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_parse_heal_flags() {
        let cli = Cli::try_parse_from([
            "mend",
            "--json",
            "heal",
            "--container",
            "ctr-1",
            "--work-dir",
            "/app",
            "--test-command",
            "npm test",
            "--max-iterations",
            "3",
            "--local",
            "--commit",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Heal {
                container,
                max_iterations,
                local,
                commit,
                logs,
                ..
            } => {
                assert_eq!(container, "ctr-1");
                assert_eq!(max_iterations, Some(3));
                assert!(local);
                assert!(commit);
                assert!(logs.is_none());
            }
            _ => panic!("expected heal"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["mend", "analyze", "--logs", "x", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_read_logs_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_logs(&dir.path().join("missing.log")).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read logs"));
    }

    #[tokio::test]
    async fn test_rollback_rejects_unsafe_container() {
        let config = MendConfig::default();
        let err = cmd_rollback(&config, "ls; rm -rf /", "/app", true)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("Invalid sandbox"));
    }
}
