// src/plan/model.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::plan::graph::DagGraph;

/// Canonical task id type used throughout the crate.
pub type TaskId = String;

/// Kind assigned to tasks whose ingestion record carries no `kind`.
pub const DEFAULT_KIND: &str = "default";

/// One task record exactly as produced by the plan-producing collaborator.
///
/// ```json
/// { "id": "task_2", "description": "...", "dependencies": ["task_1"] }
/// ```
///
/// Nothing here is trusted yet; [`crate::plan::build`] is the only consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTask {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Selects the stage processor; `None` means [`DEFAULT_KIND`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// A validated task definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    /// Opaque payload for the stage processor; never interpreted here.
    pub description: String,
    pub kind: String,
    /// Direct dependencies, de-duplicated, in declaration order.
    pub dependencies: Vec<TaskId>,
}

/// Execution status of a task. Only ever moves forward:
/// `Pending -> Running -> {Completed, Failed}`.
///
/// The result and the failure reason live inside the terminal variants, so
/// a result can only exist on a completed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed(String),
    Failed(String),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed(_) | TaskStatus::Failed(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskStatus::Completed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Running => "Running",
            TaskStatus::Completed(_) => "Completed",
            TaskStatus::Failed(_) => "Failed",
        }
    }

    pub fn result(&self) -> Option<&str> {
        match self {
            TaskStatus::Completed(result) => Some(result),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            TaskStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// A validated DAG of tasks submitted as one run.
///
/// Holds the tasks in submission order plus one topological order computed
/// while validating. Construct via [`crate::plan::build`].
#[derive(Debug, Clone)]
pub struct Plan {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    /// Positions into `tasks`, dependencies before dependents.
    order: Vec<usize>,
    graph: DagGraph,
}

impl Plan {
    /// Assemble a plan whose invariants were already checked by the builder.
    pub(crate) fn new_unchecked(tasks: Vec<Task>, order: Vec<usize>) -> Self {
        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        let graph = DagGraph::from_tasks(&tasks);

        Self {
            tasks,
            index,
            order,
            graph,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in submission order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Position of a task in submission order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Tasks ordered so that every dependency precedes its dependents.
    pub fn topological_order(&self) -> impl Iterator<Item = &Task> + '_ {
        self.order.iter().map(|&i| &self.tasks[i])
    }

    /// Group tasks into the rounds they would run in if every task succeeded.
    ///
    /// Round `n` holds tasks whose longest dependency chain has length `n`.
    pub fn levels(&self) -> Vec<Vec<&Task>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut levels: Vec<Vec<&Task>> = Vec::new();

        for task in self.topological_order() {
            let d = task
                .dependencies
                .iter()
                .filter_map(|dep| depth.get(dep.as_str()))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(task.id.as_str(), d);

            if levels.len() <= d {
                levels.resize_with(d + 1, Vec::new);
            }
            levels[d].push(task);
        }

        for level in levels.iter_mut() {
            level.sort_by_key(|t| self.index[&t.id]);
        }

        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accessors_follow_variant() {
        let done = TaskStatus::Completed("42".into());
        assert!(done.is_terminal());
        assert_eq!(done.result(), Some("42"));
        assert_eq!(done.failure_reason(), None);

        let failed = TaskStatus::Failed("nope".into());
        assert!(failed.is_terminal());
        assert_eq!(failed.result(), None);
        assert_eq!(failed.failure_reason(), Some("nope"));

        assert!(!TaskStatus::Running.is_terminal());
        assert_eq!(TaskStatus::Pending.label(), "Pending");
    }

    #[test]
    fn raw_task_kind_is_optional() {
        let raw: RawTask =
            serde_json::from_str(r#"{"id":"a","description":"d","dependencies":[]}"#).unwrap();
        assert_eq!(raw.kind, None);
    }
}
