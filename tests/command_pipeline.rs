#![cfg(unix)]

use std::error::Error;
use std::io::Write;
use std::sync::Arc;

use gatedag::aggregate::CommandSynthesizer;
use gatedag::errors::GatedagError;
use gatedag::pipeline::{Pipeline, Request};
use gatedag::planner::{CommandPlanner, FilePlanner};
use gatedag::stage::ProcessorRegistry;
use gatedag::status::StatusStream;
use gatedag_test_utils::{init_tracing, with_timeout, ConfigFileBuilder, PlanBuilder, ProcessorConfigBuilder};
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

fn plan_file(plan: &PlanBuilder) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create plan file");
    file.write_all(plan.to_json().as_bytes()).expect("write plan file");
    file
}

#[tokio::test]
async fn shell_collaborators_run_end_to_end() -> TestResult {
    init_tracing();

    let plan = plan_file(&PlanBuilder::new().task("A", &[]).task("B", &["A"]));
    let cfg = ConfigFileBuilder::new()
        .with_planner(&format!("cat {}", plan.path().display()))
        .with_default_timeout("10s")
        .with_processor(
            "default",
            ProcessorConfigBuilder::new("printf 'out-%s' \"$GATEDAG_TASK_ID\"")
                .accept_pattern("^out-")
                .build(),
        )
        // Echo the synthesis context back: one chunk per line.
        .with_synthesizer("cat")
        .build();

    let request = Request::new("combine things");
    let registry = ProcessorRegistry::from_config(&cfg, &request)?;
    let planner = cfg
        .planner
        .as_ref()
        .map(|p| CommandPlanner::from_config(p, cfg.effective_timeout(p.timeout.as_deref())))
        .expect("planner configured");
    let pipeline = Pipeline::new(
        Arc::new(planner),
        registry,
        Arc::new(CommandSynthesizer::from_config(&cfg)),
    );

    let mut stream = StatusStream::new();
    let artifact = with_timeout(pipeline.run(&request, &mut stream)).await?;

    assert!(artifact.text.contains("ORIGINAL QUERY: \"combine things\""));
    assert!(artifact.text.contains("Result for Task 'A (do A)':\nout-A"));
    assert!(artifact.text.contains("Result for Task 'B (do B)':\nout-B"));

    let lines = stream.lines();
    assert!(lines.contains(&"SYNTHESIS_CHUNK:out-A".to_string()));
    assert_eq!(lines.last().map(String::as_str), Some("PHASE: Complete"));
    Ok(())
}

#[tokio::test]
async fn dependency_results_reach_the_executor() -> TestResult {
    let plan = plan_file(&PlanBuilder::new().task("A", &[]).task("B", &["A"]));
    let cfg = ConfigFileBuilder::new()
        .with_processor(
            "default",
            // Every task prints its stdin; B's stdin carries A's result.
            ProcessorConfigBuilder::new("cat").accept_pattern(".").build(),
        )
        .build();

    let request = Request::new("q");
    let pipeline = Pipeline::new(
        Arc::new(FilePlanner::new(plan.path())),
        ProcessorRegistry::from_config(&cfg, &request)?,
        Arc::new(CommandSynthesizer::from_config(&cfg)),
    );

    let mut stream = StatusStream::new();
    let artifact = with_timeout(pipeline.run(&request, &mut stream)).await?;

    assert!(artifact.text.contains("Result from dependent task 'A': ORIGINAL GOAL"));
    Ok(())
}

#[tokio::test]
async fn validator_command_rejection_halts_the_run() -> TestResult {
    let plan = plan_file(&PlanBuilder::new().task("A", &[]).task("B", &["A"]));
    let verdict = r#"echo '{"status": "failure", "justification": "not convincing"}'"#;
    let cfg = ConfigFileBuilder::new()
        .with_processor(
            "default",
            ProcessorConfigBuilder::new("echo draft").validator(verdict).build(),
        )
        .build();

    let request = Request::new("q");
    let pipeline = Pipeline::new(
        Arc::new(FilePlanner::new(plan.path())),
        ProcessorRegistry::from_config(&cfg, &request)?,
        Arc::new(CommandSynthesizer::from_config(&cfg)),
    );

    let mut stream = StatusStream::new();
    let err = with_timeout(pipeline.run(&request, &mut stream))
        .await
        .unwrap_err();

    assert!(matches!(err, GatedagError::StageFailure { ref task, .. } if task == "A"));
    assert_eq!(
        stream.lines().last().map(String::as_str),
        Some("ERROR: task 'A' failed: not convincing")
    );
    Ok(())
}
