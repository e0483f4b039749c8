// src/planner.rs

//! Plan-producing collaborators.
//!
//! A planner turns a request into plan text in the ingestion format. Decoding
//! and validation happen afterwards in [`crate::plan`].

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::PlannerConfig;
use crate::exec::run_capture;
use crate::pipeline::Request;
use crate::prompt;
use crate::stage::StageFuture;

pub trait Planner: Send + Sync {
    /// Produce the plan text for `request`.
    fn plan<'a>(&'a self, request: &'a Request) -> StageFuture<'a, Result<String>>;
}

/// Runs a command with the planning context on stdin; stdout is the plan.
#[derive(Debug, Clone)]
pub struct CommandPlanner {
    cmd: String,
    timeout: Option<Duration>,
}

impl CommandPlanner {
    pub fn new(cmd: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            cmd: cmd.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &PlannerConfig, timeout: Option<Duration>) -> Self {
        Self::new(cfg.cmd.clone(), timeout)
    }
}

impl Planner for CommandPlanner {
    fn plan<'a>(&'a self, request: &'a Request) -> StageFuture<'a, Result<String>> {
        Box::pin(async move {
            info!(cmd = %self.cmd, "requesting plan");
            let input = prompt::planning_context(&request.query);
            let envs = [("GATEDAG_QUERY", request.query.as_str())];
            run_capture(&self.cmd, &input, &envs, self.timeout).await
        })
    }
}

/// Reads a pre-written plan from disk, ignoring the request.
#[derive(Debug, Clone)]
pub struct FilePlanner {
    path: PathBuf,
}

impl FilePlanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Planner for FilePlanner {
    fn plan<'a>(&'a self, _request: &'a Request) -> StageFuture<'a, Result<String>> {
        Box::pin(async move {
            info!(path = %self.path.display(), "reading plan file");
            tokio::fs::read_to_string(&self.path)
                .await
                .with_context(|| format!("reading plan file {}", self.path.display()))
        })
    }
}
