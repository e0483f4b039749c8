// src/aggregate.rs

//! Result aggregation and synthesis.
//!
//! Once execution ends, the results of completed tasks are collected in
//! dependency order and handed to a [`Synthesizer`], which streams the final
//! artifact back in chunks.

use std::time::Duration;

use anyhow::Result as AnyResult;
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::engine::ExecutionState;
use crate::errors::{GatedagError, Result};
use crate::exec::run_streaming;
use crate::pipeline::Request;
use crate::plan::TaskId;
use crate::prompt;
use crate::stage::StageFuture;
use crate::status::{Phase, StatusEvent, StatusStream};

/// One accepted task result, as seen by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedResult {
    pub task: TaskId,
    pub description: String,
    pub output: String,
}

/// The final output of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Concatenation of every synthesis chunk, in order.
    pub text: String,
    /// Tasks whose results fed the synthesis, dependencies first.
    pub sources: Vec<TaskId>,
}

/// Turns the ordered results into the final artifact, chunk by chunk.
pub trait Synthesizer: Send + Sync {
    fn synthesize<'a>(
        &'a self,
        request: &'a Request,
        results: &'a [CompletedResult],
        on_chunk: &'a mut (dyn FnMut(String) + Send),
    ) -> StageFuture<'a, AnyResult<()>>;
}

/// Completed results eligible for synthesis, in topological order.
///
/// Fails with `SynthesisUnavailable` when nothing is eligible.
pub fn collect(state: &ExecutionState) -> Result<Vec<CompletedResult>> {
    let results: Vec<CompletedResult> = state
        .completed_results()
        .into_iter()
        .map(|(task, output)| CompletedResult {
            task: task.id.clone(),
            description: task.description.clone(),
            output: output.to_string(),
        })
        .collect();

    if results.is_empty() {
        return Err(GatedagError::SynthesisUnavailable);
    }

    debug!(results = results.len(), "collected results for synthesis");
    Ok(results)
}

/// Collect results, enter the `Synthesizing` phase and stream the artifact.
pub async fn aggregate(
    state: &ExecutionState,
    request: &Request,
    synthesizer: &dyn Synthesizer,
    stream: &mut StatusStream,
) -> Result<Artifact> {
    let results = collect(state)?;
    stream.emit(StatusEvent::Phase(Phase::Synthesizing));
    info!(results = results.len(), "synthesizing final artifact");

    let mut text = String::new();
    let mut on_chunk = |chunk: String| {
        text.push_str(&chunk);
        stream.emit(StatusEvent::SynthesisChunk(chunk));
    };

    synthesizer
        .synthesize(request, &results, &mut on_chunk)
        .await
        .map_err(|e| GatedagError::Synthesis(format!("{e:#}")))?;

    Ok(Artifact {
        text,
        sources: results.into_iter().map(|r| r.task).collect(),
    })
}

/// Synthesizer backed by an external command; every stdout line is a chunk.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    cmd: String,
    timeout: Option<Duration>,
}

impl CommandSynthesizer {
    pub fn new(cmd: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            cmd: cmd.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        let own = cfg.synthesizer.timeout.as_deref();
        Self::new(cfg.synthesizer.cmd.clone(), cfg.effective_timeout(own))
    }
}

impl Synthesizer for CommandSynthesizer {
    fn synthesize<'a>(
        &'a self,
        request: &'a Request,
        results: &'a [CompletedResult],
        on_chunk: &'a mut (dyn FnMut(String) + Send),
    ) -> StageFuture<'a, AnyResult<()>> {
        Box::pin(async move {
            let input = prompt::synthesis_context(&request.query, results);
            let envs = [("GATEDAG_QUERY", request.query.as_str())];

            let mut forward = |line: String| on_chunk(format!("{line}\n"));
            run_streaming(&self.cmd, &input, &envs, self.timeout, &mut forward).await?;
            Ok(())
        })
    }
}
