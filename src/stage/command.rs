// src/stage/command.rs

//! Stage processor backed by external commands.
//!
//! The executor command reads the rendered task context on stdin and prints
//! the raw output. Validation either pipes the critique context into a
//! validator command that prints a verdict JSON object, or matches a regex
//! against the raw output.

use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};

use crate::config::ProcessorConfig;
use crate::engine::DependencyResult;
use crate::errors::GatedagError;
use crate::exec::run_capture;
use crate::plan::Task;
use crate::prompt;
use crate::stage::{StageFuture, StageProcessor, Verdict};

/// How raw output is judged.
#[derive(Debug, Clone)]
pub enum Validation {
    /// Run this command; its stdout is the verdict.
    Command(String),
    /// Accept iff the raw output matches.
    Pattern(Regex),
}

#[derive(Debug, Clone)]
pub struct CommandProcessor {
    cmd: String,
    validation: Validation,
    timeout: Option<Duration>,
    query: String,
}

impl CommandProcessor {
    pub fn new(
        cmd: impl Into<String>,
        validation: Validation,
        timeout: Option<Duration>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            cmd: cmd.into(),
            validation,
            timeout,
            query: query.into(),
        }
    }

    /// Build from a validated `[processor.<kind>]` section.
    pub fn from_config(
        cfg: &ProcessorConfig,
        timeout: Option<Duration>,
        query: &str,
    ) -> crate::errors::Result<Self> {
        let validation = match (&cfg.validator, &cfg.accept_pattern) {
            (Some(validator), None) => Validation::Command(validator.clone()),
            (None, Some(pattern)) => Validation::Pattern(Regex::new(pattern).map_err(|e| {
                GatedagError::ConfigError(format!("invalid accept_pattern '{pattern}': {e}"))
            })?),
            _ => {
                return Err(GatedagError::ConfigError(format!(
                    "processor '{}' needs exactly one of validator / accept_pattern",
                    cfg.cmd
                )));
            }
        };

        Ok(Self::new(cfg.cmd.clone(), validation, timeout, query))
    }

    fn envs<'a>(&'a self, task: &'a Task) -> [(&'static str, &'a str); 3] {
        [
            ("GATEDAG_TASK_ID", task.id.as_str()),
            ("GATEDAG_TASK_KIND", task.kind.as_str()),
            ("GATEDAG_QUERY", self.query.as_str()),
        ]
    }
}

impl StageProcessor for CommandProcessor {
    fn execute<'a>(
        &'a self,
        task: &'a Task,
        dependencies: &'a [DependencyResult],
    ) -> StageFuture<'a, Result<String>> {
        Box::pin(async move {
            info!(task = %task.id, kind = %task.kind, cmd = %self.cmd, "executing task");
            let input = prompt::task_context(&self.query, task, dependencies);
            run_capture(&self.cmd, &input, &self.envs(task), self.timeout).await
        })
    }

    fn validate<'a>(
        &'a self,
        task: &'a Task,
        raw_output: &'a str,
    ) -> StageFuture<'a, Result<Verdict>> {
        Box::pin(async move {
            match &self.validation {
                Validation::Pattern(re) => {
                    if re.is_match(raw_output) {
                        Ok(Verdict::accept(format!("output matches /{}/", re.as_str())))
                    } else {
                        Ok(Verdict::reject(format!(
                            "output does not match /{}/",
                            re.as_str()
                        )))
                    }
                }
                Validation::Command(validator) => {
                    debug!(task = %task.id, cmd = %validator, "validating output");
                    let input = prompt::critique_context(&self.query, task, raw_output);
                    let text = run_capture(validator, &input, &self.envs(task), self.timeout)
                        .await
                        .context("running validator")?;
                    Ok(Verdict::decode(&text)?)
                }
            }
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::StageOutcome;

    fn task() -> Task {
        Task {
            id: "t1".into(),
            description: "say hi".into(),
            kind: "default".into(),
            dependencies: Vec::new(),
        }
    }

    #[tokio::test]
    async fn pattern_validation_accepts_matching_output() {
        let p = CommandProcessor::new(
            "printf 'hello from %s' \"$GATEDAG_TASK_ID\"",
            Validation::Pattern(Regex::new("^hello").unwrap()),
            None,
            "q",
        );
        assert_eq!(
            p.process(&task(), &[]).await,
            StageOutcome::completed("hello from t1", "output matches /^hello/")
        );
    }

    #[tokio::test]
    async fn validator_command_rejection_is_a_failure() {
        let p = CommandProcessor::new(
            "echo draft",
            Validation::Command(
                r#"echo '{"status":"failure","justification":"too short"}'"#.into(),
            ),
            None,
            "q",
        );
        assert_eq!(
            p.process(&task(), &[]).await,
            StageOutcome::Failed("too short".into())
        );
    }

    #[tokio::test]
    async fn garbled_verdict_is_a_failure() {
        let p = CommandProcessor::new(
            "echo draft",
            Validation::Command("echo looks good to me".into()),
            None,
            "q",
        );
        match p.process(&task(), &[]).await {
            StageOutcome::Failed(reason) => assert!(reason.contains("invalid verdict"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_is_a_failure() {
        let p = CommandProcessor::new(
            "sleep 5",
            Validation::Pattern(Regex::new(".").unwrap()),
            Some(Duration::from_millis(100)),
            "q",
        );
        match p.process(&task(), &[]).await {
            StageOutcome::Failed(reason) => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
