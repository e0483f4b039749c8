// src/pipeline.rs

//! One request, end to end: plan, execute, synthesize.
//!
//! Every phase change and task transition goes onto the status stream. A run
//! ends either with `PHASE: Complete` or with exactly one `ERROR` line naming
//! what stopped it; nothing is emitted after either.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info};

use crate::aggregate::{aggregate, Artifact, Synthesizer};
use crate::engine::{ExecutionState, Runtime};
use crate::errors::{GatedagError, Result};
use crate::plan::{build, decode_plan, Plan};
use crate::planner::Planner;
use crate::stage::ProcessorRegistry;
use crate::status::{Phase, StatusEvent, StatusStream};

/// A single user request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub query: String,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

/// Decode, validate and kind-check plan text.
pub fn accept_plan(text: &str, processors: &ProcessorRegistry) -> Result<Plan> {
    let raw = decode_plan(text)?;
    let plan = build(raw)?;
    processors.check_plan(&plan)?;
    Ok(plan)
}

pub struct Pipeline {
    planner: Arc<dyn Planner>,
    processors: ProcessorRegistry,
    synthesizer: Arc<dyn Synthesizer>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("processors", &self.processors)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(
        planner: Arc<dyn Planner>,
        processors: ProcessorRegistry,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            planner,
            processors,
            synthesizer,
        }
    }

    /// Run `request` to completion, reporting on `stream`.
    ///
    /// On failure the terminal `ERROR` event has already been emitted when
    /// the error is returned.
    pub async fn run(&self, request: &Request, stream: &mut StatusStream) -> Result<Artifact> {
        match self.run_phases(request, stream).await {
            Ok(artifact) => {
                stream.emit(StatusEvent::Phase(Phase::Complete));
                info!(sources = artifact.sources.len(), "run complete");
                Ok(artifact)
            }
            Err(err) => {
                error!(error = %err, "run failed");
                stream.emit(StatusEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    async fn run_phases(&self, request: &Request, stream: &mut StatusStream) -> Result<Artifact> {
        stream.emit(StatusEvent::Phase(Phase::Planning));
        let text = self
            .planner
            .plan(request)
            .await
            .map_err(|e| GatedagError::Planner(format!("{e:#}")))?;

        let plan = accept_plan(&text, &self.processors)?;
        info!(tasks = plan.len(), "plan accepted");
        stream.emit(StatusEvent::PlanAccepted { tasks: plan.len() });

        stream.emit(StatusEvent::Phase(Phase::Executing));
        let mut state = ExecutionState::new(plan);
        Runtime::new(self.processors.clone())
            .run(&mut state, stream)
            .await?;

        aggregate(&state, request, self.synthesizer.as_ref(), stream).await
    }
}
