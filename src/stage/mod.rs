// src/stage/mod.rs

//! Stage processors: execute one task, then judge its output.
//!
//! The scheduler only ever calls [`StageProcessor::process`], which composes
//! the two steps and folds every error into a [`StageOutcome`]. Processors
//! are looked up by task kind in a [`ProcessorRegistry`].
//!
//! - [`command`] runs external commands (the production processor).
//! - [`verdict`] decodes validator output.
//! - [`registry`] is the kind → processor dispatch table.

pub mod command;
pub mod registry;
pub mod verdict;

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use tracing::debug;

use crate::engine::{DependencyResult, StageOutcome};
use crate::plan::Task;

pub use command::CommandProcessor;
pub use registry::ProcessorRegistry;
pub use verdict::{Verdict, VerdictError, VerdictStatus};

/// Boxed future returned by processor methods.
pub type StageFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstracting how one task is executed and judged.
///
/// Production code uses [`CommandProcessor`]; tests provide scripted
/// implementations that don't spawn processes.
pub trait StageProcessor: Send + Sync {
    /// Produce raw output for `task` given its dependencies' results, in
    /// declared dependency order.
    fn execute<'a>(
        &'a self,
        task: &'a Task,
        dependencies: &'a [DependencyResult],
    ) -> StageFuture<'a, Result<String>>;

    /// Judge the raw output.
    fn validate<'a>(
        &'a self,
        task: &'a Task,
        raw_output: &'a str,
    ) -> StageFuture<'a, Result<Verdict>>;

    /// Execute, then validate. Never fails: errors become `Failed`.
    fn process<'a>(
        &'a self,
        task: &'a Task,
        dependencies: &'a [DependencyResult],
    ) -> StageFuture<'a, StageOutcome> {
        Box::pin(async move {
            let raw = match self.execute(task, dependencies).await {
                Ok(raw) => raw,
                Err(e) => return StageOutcome::Failed(format!("execution failed: {e:#}")),
            };

            match self.validate(task, &raw).await {
                Ok(verdict) if verdict.is_accepted() => {
                    debug!(task = %task.id, "output accepted");
                    StageOutcome::Completed {
                        output: raw,
                        justification: verdict.justification,
                    }
                }
                Ok(verdict) => StageOutcome::Failed(verdict.justification),
                Err(e) => StageOutcome::Failed(format!("validation failed: {e:#}")),
            }
        })
    }
}
