#![allow(dead_code)]

use std::collections::BTreeMap;

use gatedag::config::{
    ConfigFile, ConfigSection, PlannerConfig, ProcessorConfig, RawConfigFile, SynthesizerConfig,
};
use gatedag::plan::{build, Plan, RawTask};

/// Builder for plans in the ingestion shape.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    tasks: Vec<RawTask>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four-task diamond: A; B, C after A; D after B and C.
    pub fn diamond() -> Self {
        Self::new()
            .task("A", &[])
            .task("B", &["A"])
            .task("C", &["A"])
            .task("D", &["B", "C"])
    }

    /// Add a task of the default kind. Its description is `"do <id>"`.
    pub fn task(self, id: &str, deps: &[&str]) -> Self {
        self.push(id, None, deps)
    }

    pub fn task_of_kind(self, id: &str, kind: &str, deps: &[&str]) -> Self {
        self.push(id, Some(kind), deps)
    }

    fn push(mut self, id: &str, kind: Option<&str>, deps: &[&str]) -> Self {
        self.tasks.push(RawTask {
            id: id.to_string(),
            description: format!("do {id}"),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            kind: kind.map(str::to_string),
        });
        self
    }

    pub fn raw(&self) -> Vec<RawTask> {
        self.tasks.clone()
    }

    /// Ingestion JSON: `{"tasks": [...]}`.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "tasks": self.tasks }).to_string()
    }

    pub fn build(self) -> Plan {
        build(self.tasks).expect("Failed to build valid plan from builder")
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                planner: None,
                processor: BTreeMap::new(),
                synthesizer: Some(SynthesizerConfig {
                    cmd: "cat".to_string(),
                    timeout: None,
                }),
            },
        }
    }

    pub fn with_processor(mut self, kind: &str, processor: ProcessorConfig) -> Self {
        self.config.processor.insert(kind.to_string(), processor);
        self
    }

    pub fn with_planner(mut self, cmd: &str) -> Self {
        self.config.planner = Some(PlannerConfig {
            cmd: cmd.to_string(),
            timeout: None,
        });
        self
    }

    pub fn with_synthesizer(mut self, cmd: &str) -> Self {
        self.config.synthesizer = Some(SynthesizerConfig {
            cmd: cmd.to_string(),
            timeout: None,
        });
        self
    }

    pub fn without_synthesizer(mut self) -> Self {
        self.config.synthesizer = None;
        self
    }

    pub fn with_default_timeout(mut self, timeout: &str) -> Self {
        self.config.config.default_timeout = Some(timeout.to_string());
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `ProcessorConfig`.
pub struct ProcessorConfigBuilder {
    processor: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            processor: ProcessorConfig {
                cmd: cmd.to_string(),
                validator: None,
                accept_pattern: None,
                timeout: None,
            },
        }
    }

    pub fn validator(mut self, cmd: &str) -> Self {
        self.processor.validator = Some(cmd.to_string());
        self
    }

    pub fn accept_pattern(mut self, pattern: &str) -> Self {
        self.processor.accept_pattern = Some(pattern.to_string());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.processor.timeout = Some(timeout.to_string());
        self
    }

    pub fn build(self) -> ProcessorConfig {
        self.processor
    }
}
