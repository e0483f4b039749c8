use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use gatedag::engine::DependencyResult;
use gatedag::plan::{Task, TaskId};
use gatedag::stage::{StageFuture, StageProcessor, Verdict};

/// What a [`ScriptedProcessor`] does for one task.
#[derive(Debug, Clone)]
pub enum Script {
    /// Produce this output and accept it.
    Accept(String),
    /// Produce some output, then reject it with this justification.
    Reject(String),
    /// Fail while producing output.
    ExecError(String),
    /// Produce output the validator cannot judge (a garbled verdict).
    GarbledVerdict,
    /// Panic inside the processor future.
    Panic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEvent {
    Started(TaskId),
    Finished(TaskId),
}

#[derive(Debug, Default)]
struct Journal {
    events: Vec<JournalEvent>,
    observed: HashMap<TaskId, Vec<DependencyResult>>,
}

/// A fake stage processor that:
/// - records dispatch order and the dependency results each task saw
/// - follows a per-task script (default: accept `"<id> done"`)
/// - optionally sleeps per task, to shuffle completion order
///
/// Clones share the journal, so a test can keep one and register another.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProcessor {
    scripts: HashMap<TaskId, Script>,
    delays: HashMap<TaskId, Duration>,
    journal: Arc<Mutex<Journal>>,
}

impl ScriptedProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, task: &str, script: Script) -> Self {
        self.scripts.insert(task.to_string(), script);
        self
    }

    pub fn reject(self, task: &str, reason: &str) -> Self {
        self.script(task, Script::Reject(reason.to_string()))
    }

    pub fn delay(mut self, task: &str, delay: Duration) -> Self {
        self.delays.insert(task.to_string(), delay);
        self
    }

    /// Output a task produces when it is accepted by default.
    pub fn default_output(task: &str) -> String {
        format!("{task} done")
    }

    /// Task ids in the order they were dispatched.
    pub fn dispatched(&self) -> Vec<TaskId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                JournalEvent::Started(id) => Some(id),
                JournalEvent::Finished(_) => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<JournalEvent> {
        self.journal.lock().unwrap().events.clone()
    }

    /// Dependency results `task` was dispatched with.
    pub fn observed(&self, task: &str) -> Option<Vec<DependencyResult>> {
        self.journal.lock().unwrap().observed.get(task).cloned()
    }

    fn record(&self, event: JournalEvent) {
        self.journal.lock().unwrap().events.push(event);
    }
}

impl StageProcessor for ScriptedProcessor {
    fn execute<'a>(
        &'a self,
        task: &'a Task,
        dependencies: &'a [DependencyResult],
    ) -> StageFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            {
                let mut journal = self.journal.lock().unwrap();
                journal.events.push(JournalEvent::Started(task.id.clone()));
                journal
                    .observed
                    .insert(task.id.clone(), dependencies.to_vec());
            }

            if let Some(delay) = self.delays.get(&task.id) {
                tokio::time::sleep(*delay).await;
            }

            let result = match self.scripts.get(&task.id) {
                Some(Script::Accept(output)) => Ok(output.clone()),
                Some(Script::ExecError(msg)) => Err(anyhow!("{msg}")),
                Some(Script::Panic) => panic!("scripted panic in {}", task.id),
                Some(Script::Reject(_)) | Some(Script::GarbledVerdict) | None => {
                    Ok(Self::default_output(&task.id))
                }
            };

            self.record(JournalEvent::Finished(task.id.clone()));
            result
        })
    }

    fn validate<'a>(
        &'a self,
        task: &'a Task,
        _raw_output: &'a str,
    ) -> StageFuture<'a, anyhow::Result<Verdict>> {
        Box::pin(async move {
            match self.scripts.get(&task.id) {
                Some(Script::Reject(reason)) => Ok(Verdict::reject(reason.clone())),
                Some(Script::GarbledVerdict) => Ok(Verdict::decode("looks fine to me")?),
                _ => Ok(Verdict::accept("ok")),
            }
        })
    }
}
