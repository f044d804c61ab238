//! Fan-out stages: classify, patch, verify.
//!
//! All three share one contract. Given N inputs, a stage yields exactly N
//! outputs, index-aligned with the inputs. Every item runs as its own tokio
//! task. The stage joins only after all tasks have settled. An item that
//! errors, returns malformed data or panics is replaced by the stage's
//! sentinel; its siblings are never cancelled.

pub mod classify;
pub mod controls;
pub mod patch;
pub mod verify;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, Instrument, Span};

use crate::inference::InferenceError;
use crate::obs;

pub use classify::Classifier;
pub use controls::complete_with_controls;
pub use patch::PatchGenerator;
pub use verify::Verifier;

/// Why a single item fell back to its sentinel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One per-item transformation run under the fan-out contract.
#[async_trait]
pub trait FanOutStage: Send + Sync + 'static {
    type Input: Clone + Send + 'static;
    type Output: Send + 'static;

    /// Stage name used in logs.
    const NAME: &'static str;

    /// Transform one item. Errors are turned into the sentinel by [`run_stage`].
    async fn process(&self, input: Self::Input) -> Result<Self::Output, StageError>;

    /// Placeholder output that keeps index alignment when `process` fails.
    fn sentinel(input: Self::Input, reason: &str) -> Self::Output;
}

/// Run `stage` over `inputs` concurrently and join on all of them.
///
/// `outputs[i]` always corresponds to `inputs[i]`.
pub async fn run_stage<S: FanOutStage>(stage: Arc<S>, inputs: Vec<S::Input>) -> Vec<S::Output> {
    let total = inputs.len();
    let handles: Vec<_> = inputs
        .iter()
        .cloned()
        .map(|input| {
            let stage = Arc::clone(&stage);
            tokio::spawn(
                async move {
                    match stage.process(input.clone()).await {
                        Ok(output) => output,
                        Err(err) => {
                            let reason = err.to_string();
                            obs::emit_item_degraded(S::NAME, &reason);
                            S::sentinel(input, &reason)
                        }
                    }
                }
                .instrument(Span::current()),
            )
        })
        .collect();

    let settled = join_all(handles).await;
    let outputs: Vec<S::Output> = inputs
        .into_iter()
        .zip(settled)
        .enumerate()
        .map(|(index, (input, joined))| match joined {
            Ok(output) => output,
            Err(join_err) => {
                let reason = format!("task {index} aborted: {join_err}");
                obs::emit_item_degraded(S::NAME, &reason);
                S::sentinel(input, &reason)
            }
        })
        .collect();

    debug!(stage = S::NAME, items = total, "stage settled");
    outputs
}
