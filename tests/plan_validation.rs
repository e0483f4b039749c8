use std::error::Error;
use std::sync::Arc;

use gatedag::errors::GatedagError;
use gatedag::pipeline::accept_plan;
use gatedag::plan::{build, decode_plan, PlanRule};
use gatedag::stage::ProcessorRegistry;
use gatedag_test_utils::{PlanBuilder, ScriptedProcessor};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn object_and_bare_array_forms_decode_alike() -> TestResult {
    let object = r#"{"tasks": [{"id": "A", "description": "a", "dependencies": []}]}"#;
    let array = r#"[{"id": "A", "description": "a"}]"#;

    assert_eq!(decode_plan(object)?, decode_plan(array)?);
    Ok(())
}

#[test]
fn malformed_entry_is_named() {
    let text = r#"{"tasks": [
        {"id": "A", "description": "a"},
        {"id": "B", "dependencies": ["A"]}
    ]}"#;

    let err = decode_plan(text).unwrap_err();
    assert_eq!(err.rule, PlanRule::Malformed);
    assert_eq!(err.task_ids, vec!["B"]);
    assert!(err.detail.contains("entry 1"), "{}", err.detail);
}

#[test]
fn unknown_fields_are_rejected() {
    let err = decode_plan(r#"[{"id": "A", "description": "a", "priority": 1}]"#).unwrap_err();
    assert_eq!(err.rule, PlanRule::Malformed);

    let err = decode_plan(r#"{"tasks": [], "notes": "x"}"#).unwrap_err();
    assert_eq!(err.rule, PlanRule::Malformed);
}

#[test]
fn not_json_is_malformed() {
    let err = decode_plan("Sure! Here is your plan:").unwrap_err();
    assert_eq!(err.rule, PlanRule::Malformed);
}

#[test]
fn empty_plan_is_rejected() -> TestResult {
    let err = build(decode_plan(r#"{"tasks": []}"#)?).unwrap_err();
    assert_eq!(err.rule, PlanRule::Empty);
    Ok(())
}

#[test]
fn duplicate_ids_are_rejected() {
    let err = build(PlanBuilder::new().task("A", &[]).task("A", &[]).raw()).unwrap_err();
    assert_eq!(err.rule, PlanRule::DuplicateId);
    assert_eq!(err.task_ids, vec!["A"]);
}

#[test]
fn dependency_on_missing_task_is_rejected() {
    let err = build(PlanBuilder::new().task("A", &[]).task("B", &["Z"]).raw()).unwrap_err();
    assert_eq!(err.rule, PlanRule::UnknownDependency);
    assert_eq!(err.task_ids, vec!["B"]);
    assert!(err.detail.contains("'B' -> 'Z'"));
}

#[test]
fn two_task_cycle_names_both_tasks() {
    let err = build(PlanBuilder::new().task("A", &["B"]).task("B", &["A"]).raw()).unwrap_err();
    assert_eq!(err.rule, PlanRule::Cycle);
    assert_eq!(err.task_ids, vec!["A", "B"]);
}

#[test]
fn unknown_kind_is_rejected_before_execution() {
    let processor = ScriptedProcessor::new();
    let registry = ProcessorRegistry::new().with("default", Arc::new(processor.clone()));
    let text = PlanBuilder::new()
        .task("A", &[])
        .task_of_kind("B", "search", &["A"])
        .to_json();

    match accept_plan(&text, &registry) {
        Err(GatedagError::PlanInvalid(err)) => {
            assert_eq!(err.rule, PlanRule::UnknownKind);
            assert_eq!(err.task_ids, vec!["B"]);
        }
        other => panic!("expected PlanInvalid, got {other:?}"),
    }
    assert!(processor.dispatched().is_empty());
}

#[test]
fn validated_plan_keeps_submission_order() -> TestResult {
    let registry = ProcessorRegistry::new().with("default", Arc::new(ScriptedProcessor::new()));
    let plan = accept_plan(&PlanBuilder::diamond().to_json(), &registry)?;

    let ids: Vec<&str> = plan.tasks().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B", "C", "D"]);
    assert_eq!(plan.graph().dependents_of("A"), vec!["B", "C"]);
    Ok(())
}
