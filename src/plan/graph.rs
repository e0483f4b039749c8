// src/plan/graph.rs

use std::collections::HashMap;

use crate::plan::model::{Task, TaskId};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct dependencies: tasks that must complete before this one runs.
    deps: Vec<TaskId>,
    /// Direct dependents: tasks that consume this one's result.
    dependents: Vec<TaskId>,
}

/// In-memory adjacency for a plan, keyed by task id.
///
/// Acyclicity and reference checks already happened in the builder; this
/// only answers "who do I wait on" and "who waits on me".
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<TaskId, DagNode>,
}

impl DagGraph {
    /// Build the adjacency from validated tasks.
    ///
    /// Dependents are recorded in the order the dependent tasks appear.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let mut nodes: HashMap<TaskId, DagNode> = tasks
            .iter()
            .map(|t| {
                (
                    t.id.clone(),
                    DagNode {
                        deps: t.dependencies.clone(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();

        for task in tasks {
            for dep in &task.dependencies {
                if let Some(dep_node) = nodes.get_mut(dep) {
                    dep_node.dependents.push(task.id.clone());
                }
            }
        }

        Self { nodes }
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Tasks with no dependencies (unordered).
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.deps.is_empty())
            .map(|(id, _)| id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            description: String::new(),
            kind: "default".to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn dependents_mirror_dependencies() {
        let tasks = vec![
            task("A", &[]),
            task("B", &["A"]),
            task("C", &["A"]),
            task("D", &["B", "C"]),
        ];
        let graph = DagGraph::from_tasks(&tasks);

        assert_eq!(graph.dependents_of("A"), ["B".to_string(), "C".to_string()]);
        assert_eq!(graph.dependencies_of("D"), ["B".to_string(), "C".to_string()]);
        assert!(graph.dependents_of("D").is_empty());
        assert_eq!(graph.roots().collect::<Vec<_>>(), vec!["A"]);
        assert!(graph.dependencies_of("missing").is_empty());
    }
}
