// src/plan/builder.rs

//! Plan decoding and validation.
//!
//! [`decode_plan`] is the strict decode step for the ingestion JSON and
//! [`build`] runs the semantic checks, in order:
//!
//! 1. shape of each entry (non-empty plan, non-blank ids / kinds / deps)
//! 2. id uniqueness
//! 3. every dependency names a task in the plan
//! 4. acyclicity, via repeated removal of zero-indegree nodes
//!
//! The first violated rule is reported; nothing is ever dispatched for a plan
//! that fails here.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde_json::Value;
use tracing::debug;

use crate::plan::model::{Plan, RawTask, Task, TaskId, DEFAULT_KIND};
use crate::plan::{PlanInvalid, PlanRule};

/// Decode the ingestion format into raw task records.
///
/// Accepts `{ "tasks": [ ... ] }` or a bare array, optionally wrapped in a
/// single markdown code fence. Every entry is decoded on its own so the error
/// can point at the offending one.
pub fn decode_plan(text: &str) -> Result<Vec<RawTask>, PlanInvalid> {
    let body = strip_code_fence(text);

    let value: Value = serde_json::from_str(body).map_err(|e| {
        PlanInvalid::new(
            PlanRule::Malformed,
            Vec::new(),
            format!("plan is not valid JSON: {e}"),
        )
    })?;

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut map) => {
            if let Some(extra) = map.keys().find(|k| k.as_str() != "tasks") {
                return Err(PlanInvalid::new(
                    PlanRule::Malformed,
                    Vec::new(),
                    format!("unexpected top-level field '{extra}' (expected only \"tasks\")"),
                ));
            }
            match map.remove("tasks") {
                Some(Value::Array(entries)) => entries,
                Some(_) => {
                    return Err(PlanInvalid::new(
                        PlanRule::Malformed,
                        Vec::new(),
                        "\"tasks\" must be a list",
                    ));
                }
                None => {
                    return Err(PlanInvalid::new(
                        PlanRule::Malformed,
                        Vec::new(),
                        "missing \"tasks\" list",
                    ));
                }
            }
        }
        _ => {
            return Err(PlanInvalid::new(
                PlanRule::Malformed,
                Vec::new(),
                "plan must be an object with a \"tasks\" list or a list of tasks",
            ));
        }
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let id_hint = entry
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string);
            serde_json::from_value::<RawTask>(entry).map_err(|e| {
                let ids = id_hint.clone().into_iter().collect();
                let label = match &id_hint {
                    Some(id) => format!("task '{id}' (entry {i})"),
                    None => format!("entry {i}"),
                };
                PlanInvalid::new(PlanRule::Malformed, ids, format!("{label}: {e}"))
            })
        })
        .collect()
}

/// Turn raw task records into a validated [`Plan`].
pub fn build(raw: Vec<RawTask>) -> Result<Plan, PlanInvalid> {
    let tasks = check_shape(raw)?;
    check_unique_ids(&tasks)?;
    check_dependencies_exist(&tasks)?;
    let order = topological_order(&tasks)?;

    debug!(tasks = tasks.len(), "plan validated");
    Ok(Plan::new_unchecked(tasks, order))
}

fn check_shape(raw: Vec<RawTask>) -> Result<Vec<Task>, PlanInvalid> {
    if raw.is_empty() {
        return Err(PlanInvalid::new(
            PlanRule::Empty,
            Vec::new(),
            "plan must contain at least one task",
        ));
    }

    let mut tasks = Vec::with_capacity(raw.len());

    for (i, entry) in raw.into_iter().enumerate() {
        if entry.id.trim().is_empty() {
            return Err(PlanInvalid::new(
                PlanRule::Malformed,
                Vec::new(),
                format!("entry {i} has a blank id"),
            ));
        }

        if entry.dependencies.iter().any(|d| d.trim().is_empty()) {
            return Err(PlanInvalid::new(
                PlanRule::Malformed,
                vec![entry.id.clone()],
                format!("task '{}' lists a blank dependency id", entry.id),
            ));
        }

        let kind = match entry.kind {
            Some(kind) if kind.trim().is_empty() => {
                return Err(PlanInvalid::new(
                    PlanRule::Malformed,
                    vec![entry.id.clone()],
                    format!("task '{}' has a blank kind", entry.id),
                ));
            }
            Some(kind) => kind,
            None => DEFAULT_KIND.to_string(),
        };

        // Dependencies are a set; keep the first occurrence of each.
        let mut seen = HashSet::new();
        let dependencies: Vec<TaskId> = entry
            .dependencies
            .into_iter()
            .filter(|d| seen.insert(d.clone()))
            .collect();

        tasks.push(Task {
            id: entry.id,
            description: entry.description,
            kind,
            dependencies,
        });
    }

    Ok(tasks)
}

fn check_unique_ids(tasks: &[Task]) -> Result<(), PlanInvalid> {
    let mut seen = HashSet::new();
    let mut duplicates: Vec<TaskId> = Vec::new();

    for task in tasks {
        if !seen.insert(task.id.as_str()) && !duplicates.contains(&task.id) {
            duplicates.push(task.id.clone());
        }
    }

    if duplicates.is_empty() {
        Ok(())
    } else {
        let detail = format!("task ids used more than once: {}", duplicates.join(", "));
        Err(PlanInvalid::new(PlanRule::DuplicateId, duplicates, detail))
    }
}

fn check_dependencies_exist(tasks: &[Task]) -> Result<(), PlanInvalid> {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    let mut offenders = Vec::new();
    let mut missing = Vec::new();

    for task in tasks {
        for dep in &task.dependencies {
            if !ids.contains(dep.as_str()) {
                if !offenders.contains(&task.id) {
                    offenders.push(task.id.clone());
                }
                missing.push(format!("'{}' -> '{}'", task.id, dep));
            }
        }
    }

    if offenders.is_empty() {
        Ok(())
    } else {
        let detail = format!("dependencies on tasks not in the plan: {}", missing.join(", "));
        Err(PlanInvalid::new(PlanRule::UnknownDependency, offenders, detail))
    }
}

/// Kahn's algorithm over a petgraph graph.
///
/// Edge direction: dep -> task. Sources are taken in submission order so the
/// resulting order is deterministic. If tasks remain once the sources run
/// out, the strongly connected components among them name the cycle members.
fn topological_order(tasks: &[Task]) -> Result<Vec<usize>, PlanInvalid> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(tasks.len(), tasks.len());
    let nodes: Vec<NodeIndex> = (0..tasks.len()).map(|i| graph.add_node(i)).collect();
    let position: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();

    for (i, task) in tasks.iter().enumerate() {
        for dep in &task.dependencies {
            let d = position[dep.as_str()];
            graph.add_edge(nodes[d], nodes[i], ());
        }
    }

    let mut indegree: Vec<usize> = nodes
        .iter()
        .map(|&n| graph.edges_directed(n, Direction::Incoming).count())
        .collect();

    let mut sources: VecDeque<usize> = (0..tasks.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(i) = sources.pop_front() {
        order.push(i);

        let mut dependents: Vec<usize> = graph
            .neighbors_directed(nodes[i], Direction::Outgoing)
            .map(|n| graph[n])
            .collect();
        dependents.sort_unstable();

        for j in dependents {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                sources.push_back(j);
            }
        }
    }

    if order.len() == tasks.len() {
        return Ok(order);
    }

    let unordered = tasks.len() - order.len();
    let mut members: Vec<usize> = tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .flatten()
        .map(|n| graph[n])
        .collect();
    members.sort_unstable();

    let ids: Vec<TaskId> = members.iter().map(|&i| tasks[i].id.clone()).collect();
    let detail = format!(
        "dependency cycle through {} ({} task(s) could not be ordered)",
        ids.join(", "),
        unordered
    );

    Err(PlanInvalid::new(PlanRule::Cycle, ids, detail))
}

pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (e.g. "json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };

    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
