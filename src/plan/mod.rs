// src/plan/mod.rs

//! Task plans: the data model, the adjacency graph and the validating builder.
//!
//! - [`model`] holds `RawTask` (ingestion shape), `Task`, `TaskStatus` and
//!   the validated `Plan`.
//! - [`graph`] keeps dependency / dependent adjacency for a plan.
//! - [`builder`] decodes the ingestion JSON and turns raw tasks into a
//!   verified DAG or rejects them with [`PlanInvalid`].

pub mod builder;
pub mod graph;
pub mod model;

use std::fmt;

use thiserror::Error;

pub use builder::{build, decode_plan};
pub use graph::DagGraph;
pub use model::{Plan, RawTask, Task, TaskId, TaskStatus, DEFAULT_KIND};

/// Which plan invariant was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanRule {
    /// An entry does not have the expected shape.
    Malformed,
    /// The plan contains no tasks at all.
    Empty,
    /// Two or more tasks share an id.
    DuplicateId,
    /// A dependency names a task that is not in the plan.
    UnknownDependency,
    /// The dependency relation is not acyclic.
    Cycle,
    /// A task names a kind that no stage processor handles.
    UnknownKind,
}

impl fmt::Display for PlanRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanRule::Malformed => "malformed entry",
            PlanRule::Empty => "empty plan",
            PlanRule::DuplicateId => "duplicate id",
            PlanRule::UnknownDependency => "unknown dependency",
            PlanRule::Cycle => "cycle",
            PlanRule::UnknownKind => "unknown kind",
        };
        f.write_str(s)
    }
}

/// A plan was rejected before any task ran.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid plan ({rule}): {detail}")]
pub struct PlanInvalid {
    pub rule: PlanRule,
    /// Offending task ids, in plan order where that is meaningful.
    pub task_ids: Vec<TaskId>,
    pub detail: String,
}

impl PlanInvalid {
    pub fn new(rule: PlanRule, task_ids: Vec<TaskId>, detail: impl Into<String>) -> Self {
        Self {
            rule,
            task_ids,
            detail: detail.into(),
        }
    }
}
