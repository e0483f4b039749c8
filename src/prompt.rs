// src/prompt.rs

//! Context blocks handed to collaborator commands on stdin.

use crate::aggregate::CompletedResult;
use crate::engine::DependencyResult;
use crate::plan::Task;

/// Input for the plan-producing command.
pub fn planning_context(query: &str) -> String {
    format!(
        "USER REQUEST: \"{query}\"\n\
         \n\
         Break the request into tasks. Reply with JSON only:\n\
         {{\"tasks\": [{{\"id\": \"task_1\", \"description\": \"...\", \"dependencies\": []}}]}}\n\
         Dependencies name other task ids; they must not form a cycle.\n"
    )
}

/// Input for the command that produces a task's raw output.
pub fn task_context(query: &str, task: &Task, dependencies: &[DependencyResult]) -> String {
    let deps = if dependencies.is_empty() {
        "None.".to_string()
    } else {
        dependencies
            .iter()
            .map(|d| format!("Result from dependent task '{}': {}", d.task, d.output))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "ORIGINAL GOAL: \"{query}\"\n\
         TASK ID: {id}\n\
         TASK: \"{description}\"\n\
         \n\
         RESULTS FROM DEPENDENCIES:\n\
         {deps}\n",
        id = task.id,
        description = task.description,
    )
}

/// Input for the validator command judging `raw_output`.
pub fn critique_context(query: &str, task: &Task, raw_output: &str) -> String {
    format!(
        "ORIGINAL GOAL: \"{query}\"\n\
         TASK: \"{description}\"\n\
         \n\
         OUTPUT TO REVIEW:\n\
         {raw_output}\n\
         \n\
         Reply with exactly one JSON object: \
         {{\"status\": \"success\" | \"failure\", \"justification\": \"...\"}}\n",
        description = task.description,
    )
}

/// Input for the synthesis command: every accepted result, dependencies first.
pub fn synthesis_context(query: &str, results: &[CompletedResult]) -> String {
    let body = results
        .iter()
        .map(|r| format!("Result for Task '{} ({})':\n{}", r.task, r.description, r.output))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!("ORIGINAL QUERY: \"{query}\"\n\nVERIFIED RESULTS:\n{body}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task {
            id: "C".into(),
            description: "combine".into(),
            kind: "default".into(),
            dependencies: vec!["A".into(), "B".into()],
        }
    }

    #[test]
    fn task_context_lists_dependencies_in_order() {
        let deps = vec![
            DependencyResult {
                task: "A".into(),
                output: "alpha".into(),
            },
            DependencyResult {
                task: "B".into(),
                output: "beta".into(),
            },
        ];
        let text = task_context("q", &task(), &deps);
        let a = text.find("task 'A': alpha").unwrap();
        let b = text.find("task 'B': beta").unwrap();
        assert!(a < b);
    }

    #[test]
    fn task_context_without_dependencies() {
        let text = task_context("q", &task(), &[]);
        assert!(text.contains("None."));
    }

    #[test]
    fn synthesis_context_separates_results() {
        let results = vec![
            CompletedResult {
                task: "A".into(),
                description: "first".into(),
                output: "1".into(),
            },
            CompletedResult {
                task: "B".into(),
                description: "second".into(),
                output: "2".into(),
            },
        ];
        let text = synthesis_context("q", &results);
        assert!(text.contains("Result for Task 'A (first)':\n1\n\n---\n\nResult for Task 'B (second)':\n2"));
    }
}
