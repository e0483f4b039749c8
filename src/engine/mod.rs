// src/engine/mod.rs

//! Dependency-gated execution engine.
//!
//! The pure state machine lives in [`state`]: it owns the per-run
//! `ExecutionState`, computes ready sets, applies task transitions and
//! decides when a run is complete, halted or deadlocked. It does no IO and
//! can be driven synchronously in tests.
//!
//! The async shell is [`runtime`]: it asks the state for the next round,
//! fans the ready set out to stage processors, joins the whole batch at the
//! round barrier and feeds each terminal outcome back into the state.

pub mod runtime;
pub mod state;

/// Terminal result of one task as reported by a stage processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Output was produced and accepted; carries the result and the
    /// validator's reasoning.
    Completed {
        output: String,
        justification: String,
    },
    /// Output was rejected, or producing/judging it failed; carries the reason.
    Failed(String),
}

impl StageOutcome {
    pub fn completed(output: impl Into<String>, justification: impl Into<String>) -> Self {
        StageOutcome::Completed {
            output: output.into(),
            justification: justification.into(),
        }
    }
}

/// Run-level outcome. `Completed` and `Halted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Running,
    Completed,
    Halted,
}

pub use runtime::Runtime;
pub use state::{DependencyResult, DispatchedTask, ExecutionState, HaltCause, RoundStep};
