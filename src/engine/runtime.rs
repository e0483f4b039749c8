// src/engine/runtime.rs

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use anyhow::anyhow;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::errors::{GatedagError, Result};
use crate::plan::TaskId;
use crate::stage::ProcessorRegistry;
use crate::status::{StatusEvent, StatusStream};

use super::state::{DispatchedTask, ExecutionState, RoundStep};
use super::{RunOutcome, StageOutcome};

/// Drives an `ExecutionState` round by round and delegates the work for each
/// task to the stage processor registered for its kind.
///
/// This is the IO shell around the state machine: the state decides what is
/// ready and what the run's outcome is; the runtime fans each round out
/// concurrently, waits for all of it, and reports every transition on the
/// status stream.
pub struct Runtime {
    processors: ProcessorRegistry,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("processors", &self.processors)
            .finish()
    }
}

impl Runtime {
    pub fn new(processors: ProcessorRegistry) -> Self {
        Self { processors }
    }

    /// Run rounds until the state reaches a terminal outcome.
    ///
    /// Returns `Ok(())` when every task completed, otherwise the error that
    /// halted the run (`StageFailure` or `Deadlock`).
    pub async fn run(&self, state: &mut ExecutionState, stream: &mut StatusStream) -> Result<()> {
        info!(tasks = state.plan().len(), "execution started");

        loop {
            let batch = match state.next_round()? {
                RoundStep::Dispatch(batch) => batch,
                RoundStep::Finished(RunOutcome::Completed) => {
                    info!(rounds = state.round(), "execution finished");
                    return Ok(());
                }
                RoundStep::Finished(_) => {
                    return Err(state
                        .halt_error()
                        .unwrap_or_else(|| GatedagError::Other(anyhow!("run halted"))));
                }
            };

            self.run_round(state, stream, batch).await?;
        }
    }

    /// Dispatch one round and wait for all of it (the round barrier).
    async fn run_round(
        &self,
        state: &mut ExecutionState,
        stream: &mut StatusStream,
        batch: Vec<DispatchedTask>,
    ) -> Result<()> {
        let round = state.round();
        let names: Vec<_> = batch.iter().map(|j| j.task.id.as_str()).collect();
        debug!(round, ?names, "dispatching round");

        let mut join_set = JoinSet::new();
        let mut in_flight: HashMap<Id, TaskId> = HashMap::with_capacity(batch.len());
        // First bookkeeping error; reported only after the round has drained.
        let mut first_error: Option<GatedagError> = None;

        for job in batch {
            let task_id = job.task.id.clone();
            stream.emit(StatusEvent::TaskStarted {
                task: task_id.clone(),
                description: job.task.description.clone(),
            });

            let Some(processor) = self.processors.resolve(&job.task.kind) else {
                // Plans are checked against the registry up front; this only
                // triggers when the runtime is driven directly.
                let reason = format!("no stage processor registered for kind '{}'", job.task.kind);
                if let Err(err) = self.finish(state, stream, &task_id, StageOutcome::Failed(reason)) {
                    first_error = Some(err);
                    break;
                }
                continue;
            };

            let handle = join_set.spawn(async move {
                processor.process(&job.task, &job.dependencies).await
            });
            in_flight.insert(handle.id(), task_id);
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(err) => (err.id(), StageOutcome::Failed(describe_join_error(err))),
            };

            let Some(task_id) = in_flight.remove(&id) else {
                warn!(round, "joined a future that was never dispatched");
                continue;
            };

            if let Err(err) = self.finish(state, stream, &task_id, outcome) {
                warn!(round, task = %task_id, error = %err, "could not record outcome");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn finish(
        &self,
        state: &mut ExecutionState,
        stream: &mut StatusStream,
        task: &str,
        outcome: StageOutcome,
    ) -> Result<()> {
        match &outcome {
            StageOutcome::Completed { justification, .. } => {
                info!(task = %task, round = state.round(), "task passed");
                stream.emit(StatusEvent::TaskPassed {
                    task: task.to_string(),
                    justification: justification.clone(),
                });
            }
            StageOutcome::Failed(reason) => {
                info!(task = %task, round = state.round(), reason = %reason, "task failed");
                stream.emit(StatusEvent::TaskFailed {
                    task: task.to_string(),
                    reason: reason.clone(),
                });
            }
        }

        state.record_outcome(task, outcome)
    }
}

fn describe_join_error(err: JoinError) -> String {
    if err.is_panic() {
        format!("stage processor panicked: {}", panic_message(err.into_panic()))
    } else {
        "stage processor was cancelled".to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::engine::DependencyResult;
    use crate::plan::{build, RawTask, Task, TaskStatus};
    use crate::stage::{StageFuture, StageProcessor, Verdict};

    /// Completes with the task id unless the id is listed as failing or
    /// panicking. Slow tasks take longer than the rest of their round.
    struct Scripted {
        fail: &'static [&'static str],
        panic: &'static [&'static str],
        slow: &'static [&'static str],
    }

    impl StageProcessor for Scripted {
        fn execute<'a>(
            &'a self,
            task: &'a Task,
            _dependencies: &'a [DependencyResult],
        ) -> StageFuture<'a, anyhow::Result<String>> {
            Box::pin(async move {
                let pause = if self.slow.contains(&task.id.as_str()) { 60 } else { 5 };
                tokio::time::sleep(Duration::from_millis(pause)).await;
                if self.panic.contains(&task.id.as_str()) {
                    panic!("processor blew up on {}", task.id);
                }
                Ok(task.id.to_lowercase())
            })
        }

        fn validate<'a>(
            &'a self,
            task: &'a Task,
            _raw_output: &'a str,
        ) -> StageFuture<'a, anyhow::Result<Verdict>> {
            Box::pin(async move {
                if self.fail.contains(&task.id.as_str()) {
                    Ok(Verdict::reject("not good enough"))
                } else {
                    Ok(Verdict::accept("fine"))
                }
            })
        }
    }

    fn raw(id: &str, deps: &[&str]) -> RawTask {
        RawTask {
            id: id.to_string(),
            description: format!("do {id}"),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            kind: None,
        }
    }

    fn runtime(fail: &'static [&'static str], panic: &'static [&'static str]) -> Runtime {
        Runtime::new(
            ProcessorRegistry::new().with("default", Arc::new(Scripted {
                fail,
                panic,
                slow: &[],
            })),
        )
    }

    fn diamond() -> ExecutionState {
        ExecutionState::new(
            build(vec![
                raw("A", &[]),
                raw("B", &["A"]),
                raw("C", &["A"]),
                raw("D", &["B", "C"]),
            ])
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn diamond_completes_and_reports_every_task() {
        let mut state = diamond();
        let mut stream = StatusStream::new();

        runtime(&[], &[]).run(&mut state, &mut stream).await.unwrap();

        assert_eq!(state.outcome(), RunOutcome::Completed);
        assert_eq!(state.round(), 3);
        let passed = stream
            .events()
            .iter()
            .filter(|e| matches!(e, StatusEvent::TaskPassed { .. }))
            .count();
        assert_eq!(passed, 4);
    }

    #[tokio::test]
    async fn failure_stops_before_next_round() {
        let mut state = diamond();
        let mut stream = StatusStream::new();

        let err = runtime(&["B"], &[])
            .run(&mut state, &mut stream)
            .await
            .unwrap_err();

        assert!(matches!(err, GatedagError::StageFailure { ref task, .. } if task == "B"));
        assert_eq!(state.status_of("C"), Some(&TaskStatus::Completed("c".into())));
        assert_eq!(state.status_of("D"), Some(&TaskStatus::Pending));
        assert!(!stream.events().iter().any(
            |e| matches!(e, StatusEvent::TaskStarted { task, .. } if task == "D")
        ));
    }

    #[tokio::test]
    async fn panic_is_recorded_as_task_failure() {
        let mut state = ExecutionState::new(build(vec![raw("A", &[]), raw("B", &[])]).unwrap());
        let mut stream = StatusStream::new();

        let err = runtime(&[], &["A"])
            .run(&mut state, &mut stream)
            .await
            .unwrap_err();

        match err {
            GatedagError::StageFailure { task, reason } => {
                assert_eq!(task, "A");
                assert!(reason.contains("panicked"), "{reason}");
            }
            other => panic!("expected stage failure, got {other:?}"),
        }
        assert!(state.status_of("B").unwrap().is_completed());
    }

    #[tokio::test]
    async fn unregistered_kind_fails_the_task() {
        let mut state = ExecutionState::new(build(vec![raw("A", &[])]).unwrap());
        let mut stream = StatusStream::new();

        let err = Runtime::new(ProcessorRegistry::new())
            .run(&mut state, &mut stream)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no stage processor registered"));
    }

    #[tokio::test]
    async fn corrupted_state_halts_with_deadlock() {
        let mut state = ExecutionState::new(build(vec![raw("A", &[]), raw("B", &["A"])]).unwrap());
        state.corrupt_dependency("B", "missing");
        let mut stream = StatusStream::new();

        let err = runtime(&[], &[])
            .run(&mut state, &mut stream)
            .await
            .unwrap_err();

        match err {
            GatedagError::Deadlock { pending } => assert_eq!(pending, vec!["B".to_string()]),
            other => panic!("expected deadlock, got {other:?}"),
        }
        assert_eq!(state.outcome(), RunOutcome::Halted);
    }

    #[tokio::test]
    async fn recording_error_still_waits_for_the_whole_round() {
        let mut state = ExecutionState::new(build(vec![raw("A", &[]), raw("B", &[])]).unwrap());
        let mut stream = StatusStream::new();

        let RoundStep::Dispatch(mut batch) = state.next_round().unwrap() else {
            panic!("expected a round to dispatch");
        };
        // A second copy of A makes its second outcome an invalid transition.
        let again = batch.iter().find(|j| j.task.id == "A").cloned().unwrap();
        batch.push(again);

        let runtime = Runtime::new(ProcessorRegistry::new().with(
            "default",
            Arc::new(Scripted {
                fail: &[],
                panic: &[],
                slow: &["B"],
            }),
        ));
        let err = runtime
            .run_round(&mut state, &mut stream, batch)
            .await
            .unwrap_err();

        assert!(matches!(err, GatedagError::InvalidTransition { ref task, .. } if task == "A"));
        assert_eq!(state.status_of("B"), Some(&TaskStatus::Completed("b".into())));
        assert!(stream.events().iter().any(
            |e| matches!(e, StatusEvent::TaskPassed { task, .. } if task == "B")
        ));
    }
}
