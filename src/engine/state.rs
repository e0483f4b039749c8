// src/engine/state.rs

//! Per-run execution state and the round state machine.

use std::collections::HashMap;

use anyhow::anyhow;
use tracing::{debug, error, info, warn};

use crate::engine::{RunOutcome, StageOutcome};
use crate::errors::{GatedagError, Result};
use crate::plan::{Plan, Task, TaskId, TaskStatus};

/// Result of a completed dependency, as handed to a stage processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyResult {
    pub task: TaskId,
    pub output: String,
}

/// A task the state wants executed now, with a snapshot of exactly its
/// declared dependencies' results (in declaration order).
#[derive(Debug, Clone)]
pub struct DispatchedTask {
    pub task: Task,
    pub dependencies: Vec<DependencyResult>,
    /// Round in which the task was dispatched (1-based).
    pub round: u64,
}

/// What the scheduler should do next.
#[derive(Debug, Clone)]
pub enum RoundStep {
    /// Execute these tasks; they are already marked `Running`.
    Dispatch(Vec<DispatchedTask>),
    /// The run reached a terminal outcome.
    Finished(RunOutcome),
}

/// Why a run halted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltCause {
    StageFailure { task: TaskId, reason: String },
    Deadlock { pending: Vec<TaskId> },
}

impl From<HaltCause> for GatedagError {
    fn from(cause: HaltCause) -> Self {
        match cause {
            HaltCause::StageFailure { task, reason } => GatedagError::StageFailure { task, reason },
            HaltCause::Deadlock { pending } => GatedagError::Deadlock { pending },
        }
    }
}

/// Mutable record for one task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    dependencies: Vec<TaskId>,
    status: TaskStatus,
    /// Round in which the task reached `Completed`.
    completed_round: Option<u64>,
}

impl TaskRecord {
    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    pub fn completed_round(&self) -> Option<u64> {
        self.completed_round
    }
}

/// The scheduler's working set for one run.
///
/// Created from a validated [`Plan`]; exclusively owned and mutated by the
/// scheduler; dropped once the run is over. Transitions are forward-only and
/// a task result is written exactly once.
#[derive(Debug)]
pub struct ExecutionState {
    plan: Plan,
    records: HashMap<TaskId, TaskRecord>,
    outcome: RunOutcome,
    round: u64,
    /// Round in which the first task failure halted the run.
    failed_round: Option<u64>,
    halt_cause: Option<HaltCause>,
}

impl ExecutionState {
    pub fn new(plan: Plan) -> Self {
        let records = plan
            .tasks()
            .iter()
            .map(|t| {
                (
                    t.id.clone(),
                    TaskRecord {
                        dependencies: t.dependencies.clone(),
                        status: TaskStatus::Pending,
                        completed_round: None,
                    },
                )
            })
            .collect();

        Self {
            plan,
            records,
            outcome: RunOutcome::Running,
            round: 0,
            failed_round: None,
            halt_cause: None,
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }

    /// Number of rounds dispatched so far.
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn record(&self, task: &str) -> Option<&TaskRecord> {
        self.records.get(task)
    }

    pub fn status_of(&self, task: &str) -> Option<&TaskStatus> {
        self.records.get(task).map(|r| &r.status)
    }

    pub fn halt_cause(&self) -> Option<&HaltCause> {
        self.halt_cause.as_ref()
    }

    /// The error a halted run terminates with, if it halted.
    pub fn halt_error(&self) -> Option<GatedagError> {
        self.halt_cause.clone().map(GatedagError::from)
    }

    /// Pending tasks whose every dependency is `Completed`, in plan order.
    pub fn ready_set(&self) -> Vec<TaskId> {
        self.plan
            .tasks()
            .iter()
            .filter(|t| {
                let record = &self.records[&t.id];
                record.status == TaskStatus::Pending && self.deps_completed(record)
            })
            .map(|t| t.id.clone())
            .collect()
    }

    /// Tasks not yet in a terminal status, in plan order.
    pub fn unfinished(&self) -> Vec<TaskId> {
        self.plan
            .tasks()
            .iter()
            .filter(|t| !self.records[&t.id].status.is_terminal())
            .map(|t| t.id.clone())
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.records.values().all(|r| r.status.is_terminal())
    }

    /// Advance to the next round.
    ///
    /// - A terminal run reports its outcome.
    /// - If every task is terminal the run becomes `Completed`.
    /// - An empty ready set with unfinished tasks is a deadlock: the run is
    ///   halted and `GatedagError::Deadlock` is returned.
    /// - Otherwise every ready task is marked `Running` and returned for
    ///   dispatch together with its dependency snapshot.
    ///
    /// Must only be called once every task of the previous round has had its
    /// outcome recorded.
    pub fn next_round(&mut self) -> Result<RoundStep> {
        if self.outcome != RunOutcome::Running {
            return Ok(RoundStep::Finished(self.outcome));
        }

        let in_flight = self
            .records
            .values()
            .filter(|r| r.status == TaskStatus::Running)
            .count();
        if in_flight > 0 {
            return Err(GatedagError::Other(anyhow!(
                "round {} still has {} task(s) in flight",
                self.round,
                in_flight
            )));
        }

        if self.all_terminal() {
            info!(rounds = self.round, "all tasks completed; run finished");
            self.outcome = RunOutcome::Completed;
            return Ok(RoundStep::Finished(self.outcome));
        }

        let ready = self.ready_set();
        if ready.is_empty() {
            let pending = self.unfinished();
            error!(
                round = self.round,
                ?pending,
                "no task is ready but the run is unfinished; halting on deadlock"
            );
            self.outcome = RunOutcome::Halted;
            let cause = HaltCause::Deadlock { pending };
            self.halt_cause = Some(cause.clone());
            return Err(cause.into());
        }

        self.round += 1;
        let mut batch = Vec::with_capacity(ready.len());

        for id in ready {
            let dependencies = self.dependency_results(&id)?;
            self.mark_running(&id)?;

            let task = self
                .plan
                .get(&id)
                .cloned()
                .ok_or_else(|| GatedagError::Other(anyhow!("task '{id}' missing from plan")))?;

            batch.push(DispatchedTask {
                task,
                dependencies,
                round: self.round,
            });
        }

        debug!(round = self.round, tasks = batch.len(), "round ready");
        Ok(RoundStep::Dispatch(batch))
    }

    /// Record the terminal outcome of a running task.
    ///
    /// The first failure halts the run (fail-fast). Outcomes of siblings that
    /// were already in flight are still recorded.
    pub fn record_outcome(&mut self, task: &str, outcome: StageOutcome) -> Result<()> {
        let round = self.round;
        let record = self
            .records
            .get_mut(task)
            .ok_or_else(|| GatedagError::Other(anyhow!("outcome for unknown task '{task}'")))?;

        if record.status != TaskStatus::Running {
            let to = match outcome {
                StageOutcome::Completed { .. } => "Completed",
                StageOutcome::Failed(_) => "Failed",
            };
            return Err(GatedagError::InvalidTransition {
                task: task.to_string(),
                from: record.status.label(),
                to,
            });
        }

        match outcome {
            StageOutcome::Completed { output, .. } => {
                record.status = TaskStatus::Completed(output);
                record.completed_round = Some(round);
                debug!(task = %task, round, "task completed");
            }
            StageOutcome::Failed(reason) => {
                record.status = TaskStatus::Failed(reason.clone());

                if self.outcome == RunOutcome::Running {
                    warn!(task = %task, round, reason = %reason, "task failed; halting run");
                    self.outcome = RunOutcome::Halted;
                    self.failed_round = Some(round);
                    self.halt_cause = Some(HaltCause::StageFailure {
                        task: task.to_string(),
                        reason,
                    });
                } else {
                    debug!(task = %task, round, reason = %reason, "task failed after run halted");
                }
            }
        }

        Ok(())
    }

    /// Completed tasks eligible for aggregation, dependencies first.
    ///
    /// When the run halted on a task failure, results from the round in
    /// which it halted are excluded.
    pub fn completed_results(&self) -> Vec<(&Task, &str)> {
        self.plan
            .topological_order()
            .filter_map(|task| {
                let record = &self.records[&task.id];
                let output = record.status.result()?;
                if self.failed_round.is_some() && record.completed_round == self.failed_round {
                    return None;
                }
                Some((task, output))
            })
            .collect()
    }

    fn deps_completed(&self, record: &TaskRecord) -> bool {
        record.dependencies.iter().all(|dep| {
            self.records
                .get(dep)
                .map(|r| r.status.is_completed())
                .unwrap_or(false)
        })
    }

    fn dependency_results(&self, task: &str) -> Result<Vec<DependencyResult>> {
        let record = &self.records[task];
        record
            .dependencies
            .iter()
            .map(|dep| {
                let output = self
                    .records
                    .get(dep)
                    .and_then(|r| r.status.result())
                    .ok_or_else(|| GatedagError::InvalidTransition {
                        task: task.to_string(),
                        from: "Pending",
                        to: "Running",
                    })?;
                Ok(DependencyResult {
                    task: dep.clone(),
                    output: output.to_string(),
                })
            })
            .collect()
    }

    fn mark_running(&mut self, task: &str) -> Result<()> {
        let ready = {
            let record = &self.records[task];
            record.status == TaskStatus::Pending && self.deps_completed(record)
        };

        let record = self
            .records
            .get_mut(task)
            .ok_or_else(|| GatedagError::Other(anyhow!("unknown task '{task}'")))?;

        if !ready {
            return Err(GatedagError::InvalidTransition {
                task: task.to_string(),
                from: record.status.label(),
                to: "Running",
            });
        }

        record.status = TaskStatus::Running;
        Ok(())
    }

    /// Simulate state corruption: make `task` wait on an id that will never
    /// complete.
    #[cfg(test)]
    pub(crate) fn corrupt_dependency(&mut self, task: &str, dep: &str) {
        if let Some(record) = self.records.get_mut(task) {
            record.dependencies.push(dep.to_string());
        }
    }
}
