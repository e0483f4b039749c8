// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! The four run-terminal conditions (`PlanInvalid`, `StageFailure`,
//! `Deadlock`, `SynthesisUnavailable`) are variants here so they can be
//! matched on by callers and rendered verbatim onto the status stream.

use thiserror::Error;

use crate::plan::{PlanInvalid, TaskId};

#[derive(Error, Debug)]
pub enum GatedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    PlanInvalid(#[from] PlanInvalid),

    #[error("task '{task}' failed: {reason}")]
    StageFailure { task: TaskId, reason: String },

    #[error(
        "deadlock detected: no task is ready but {} remain unfinished: {}",
        .pending.len(),
        .pending.join(", ")
    )]
    Deadlock { pending: Vec<TaskId> },

    #[error("synthesis unavailable: no task completed successfully")]
    SynthesisUnavailable,

    #[error("invalid transition for task '{task}' from {from} to {to}")]
    InvalidTransition {
        task: TaskId,
        from: &'static str,
        to: &'static str,
    },

    #[error("planner failed: {0}")]
    Planner(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GatedagError>;
