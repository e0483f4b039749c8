// src/stage/registry.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ConfigFile;
use crate::errors::Result;
use crate::pipeline::Request;
use crate::plan::{Plan, PlanInvalid, PlanRule, TaskId};
use crate::stage::{CommandProcessor, StageProcessor};

/// Typed dispatch table from task kind to stage processor.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<String, Arc<dyn StageProcessor>>,
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("kinds", &self.kinds().collect::<Vec<_>>())
            .finish()
    }
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of command processors, one per `[processor.<kind>]`.
    pub fn from_config(cfg: &ConfigFile, request: &Request) -> Result<Self> {
        let mut registry = Self::new();
        for (kind, processor_cfg) in &cfg.processor {
            let timeout = cfg.effective_timeout(processor_cfg.timeout.as_deref());
            let processor = CommandProcessor::from_config(processor_cfg, timeout, &request.query)?;
            registry.register(kind.clone(), Arc::new(processor));
        }
        Ok(registry)
    }

    /// Register (or replace) the processor for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, processor: Arc<dyn StageProcessor>) {
        self.processors.insert(kind.into(), processor);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, kind: impl Into<String>, processor: Arc<dyn StageProcessor>) -> Self {
        self.register(kind, processor);
        self
    }

    pub fn resolve(&self, kind: &str) -> Option<Arc<dyn StageProcessor>> {
        self.processors.get(kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> + '_ {
        self.processors.keys().map(String::as_str)
    }

    /// Reject plans that name a kind no processor handles.
    pub fn check_plan(&self, plan: &Plan) -> std::result::Result<(), PlanInvalid> {
        let mut offenders: Vec<TaskId> = Vec::new();
        let mut unknown: Vec<&str> = Vec::new();

        for task in plan.tasks() {
            if !self.processors.contains_key(&task.kind) {
                offenders.push(task.id.clone());
                if !unknown.contains(&task.kind.as_str()) {
                    unknown.push(&task.kind);
                }
            }
        }

        if offenders.is_empty() {
            return Ok(());
        }

        let detail = format!(
            "no stage processor registered for kind(s) {} (tasks: {})",
            unknown.join(", "),
            offenders.join(", ")
        );
        Err(PlanInvalid::new(PlanRule::UnknownKind, offenders, detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DependencyResult;
    use crate::plan::{build, RawTask, Task};
    use crate::stage::{StageFuture, Verdict};

    struct Echo;

    impl StageProcessor for Echo {
        fn execute<'a>(
            &'a self,
            task: &'a Task,
            _dependencies: &'a [DependencyResult],
        ) -> StageFuture<'a, anyhow::Result<String>> {
            Box::pin(async move { Ok(task.id.clone()) })
        }

        fn validate<'a>(
            &'a self,
            _task: &'a Task,
            _raw_output: &'a str,
        ) -> StageFuture<'a, anyhow::Result<Verdict>> {
            Box::pin(async { Ok(Verdict::accept("ok")) })
        }
    }

    fn raw(id: &str, kind: Option<&str>) -> RawTask {
        RawTask {
            id: id.into(),
            description: id.into(),
            dependencies: Vec::new(),
            kind: kind.map(str::to_string),
        }
    }

    #[test]
    fn unknown_kind_names_offending_tasks() {
        let registry = ProcessorRegistry::new().with("default", Arc::new(Echo));
        let plan = build(vec![
            raw("A", None),
            raw("B", Some("search")),
            raw("C", Some("search")),
        ])
        .unwrap();

        let err = registry.check_plan(&plan).unwrap_err();
        assert_eq!(err.rule, PlanRule::UnknownKind);
        assert_eq!(err.task_ids, vec!["B", "C"]);
        assert!(err.detail.contains("search"));
    }

    #[test]
    fn registered_kinds_resolve() {
        let registry = ProcessorRegistry::new()
            .with("default", Arc::new(Echo))
            .with("search", Arc::new(Echo));
        assert!(registry.resolve("search").is_some());
        assert!(registry.resolve("other").is_none());
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["default", "search"]);

        let plan = build(vec![raw("A", None), raw("B", Some("search"))]).unwrap();
        assert!(registry.check_plan(&plan).is_ok());
    }
}
