// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::config::duration::parse_duration;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [config]
/// default_timeout = "120s"
///
/// [planner]
/// cmd = "./bin/plan"
///
/// [processor.default]
/// cmd = "./bin/execute"
/// validator = "./bin/critique"
///
/// [processor.lookup]
/// cmd = "./bin/lookup"
/// accept_pattern = "\\S"
/// timeout = "10s"
///
/// [synthesizer]
/// cmd = "./bin/synthesize"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// Global behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Plan-producing command from `[planner]`; optional when a plan file is
    /// supplied on the command line.
    #[serde(default)]
    pub planner: Option<PlannerConfig>,

    /// Stage processors from `[processor.<kind>]`, keyed by task kind.
    #[serde(default)]
    pub processor: BTreeMap<String, ProcessorConfig>,

    /// Synthesis command from `[synthesizer]`.
    #[serde(default)]
    pub synthesizer: Option<SynthesizerConfig>,
}

/// Validated configuration. Obtain one via `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub planner: Option<PlannerConfig>,
    pub processor: BTreeMap<String, ProcessorConfig>,
    pub synthesizer: SynthesizerConfig,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        planner: Option<PlannerConfig>,
        processor: BTreeMap<String, ProcessorConfig>,
        synthesizer: SynthesizerConfig,
    ) -> Self {
        Self {
            config,
            planner,
            processor,
            synthesizer,
        }
    }

    /// Default collaborator timeout from `[config]`, already known to parse.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.config
            .default_timeout
            .as_deref()
            .and_then(|s| parse_duration(s).ok())
    }

    /// Effective timeout for a collaborator with an optional own override.
    pub fn effective_timeout(&self, own: Option<&str>) -> Option<Duration> {
        own.and_then(|s| parse_duration(s).ok())
            .or_else(|| self.default_timeout())
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigSection {
    /// Timeout applied to planner, processor and synthesizer commands that
    /// do not set their own (e.g. `"120s"`). `None` means no timeout.
    #[serde(default)]
    pub default_timeout: Option<String>,
}

/// `[planner]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannerConfig {
    /// Command whose stdout is the plan JSON.
    pub cmd: String,

    #[serde(default)]
    pub timeout: Option<String>,
}

/// `[processor.<kind>]` section.
///
/// Exactly one of `validator` / `accept_pattern` must be set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessorConfig {
    /// Command that produces a task's raw output on stdout.
    pub cmd: String,

    /// Command that judges the raw output and prints a verdict JSON object:
    /// `{"status": "success" | "failure", "justification": "..."}`.
    #[serde(default)]
    pub validator: Option<String>,

    /// Regex; the raw output is accepted if it matches.
    #[serde(default)]
    pub accept_pattern: Option<String>,

    /// Duration string (e.g. `"30s"`) applied to each command separately.
    #[serde(default)]
    pub timeout: Option<String>,
}

/// `[synthesizer]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthesizerConfig {
    /// Command whose stdout lines are streamed as the final artifact.
    pub cmd: String,

    #[serde(default)]
    pub timeout: Option<String>,
}
