//! End-to-end tests for the public problem-reporting API.
//!
//! These walk the whole pipeline the way an embedding build engine
//! would: obtain a builder from the reporter, walk the staged views,
//! and observe delivery through a sink under a tracked operation.

use std::sync::Arc;

use anyhow::anyhow;
use foghorn::builder::{
    DefineCategory, DefineDetails, DefineDocumentation, DefineGroup, DefineLocation, DefineMessage,
};
use foghorn::events::{CollectingSink, JsonLineSink, Operation};
use foghorn::{Delegating, ProblemError, ProblemGroup, ProblemReporter, Severity};

fn reporter_with_sink() -> (ProblemReporter, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    (ProblemReporter::new(sink.clone()), sink)
}

#[test]
fn report_problem_during_tracked_operation() {
    let (reporter, sink) = reporter_with_sink();
    let operation = Operation::start("validate task graph");

    let problem = reporter
        .create_builder()
        .message("missing output")
        .unwrap()
        .undocumented()
        .no_location()
        .category("validation")
        .unwrap()
        .group_id(foghorn::group::GENERIC_ID)
        .unwrap()
        .build()
        .unwrap();

    assert_eq!(problem.severity(), Severity::Error);
    assert!(problem.location().is_none());

    problem.report();

    let events = sink.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].problem_id, "generic:validation");
    assert_eq!(events[0].operation_id, Some(operation.id().get()));
}

#[test]
fn reporting_outside_any_operation_is_a_quiet_no_op() {
    let (reporter, sink) = reporter_with_sink();

    let problem = reporter
        .create_builder()
        .message("nobody is listening")
        .unwrap()
        .undocumented()
        .no_location()
        .category("validation")
        .unwrap()
        .group_id(foghorn::group::GENERIC_ID)
        .unwrap()
        .build()
        .unwrap();

    problem.report();
    reporter.collect(&problem);
    assert!(sink.events().is_empty());
}

#[test]
fn custom_groups_flow_through_to_events() {
    let (reporter, sink) = reporter_with_sink();
    reporter.register_group("caching").unwrap();

    let _operation = Operation::start("configure cache");
    let error = reporter.throwing(|builder| {
        Ok(builder
            .message("cache directory is not writable")?
            .documented_at("https://docs.example/caching")
            .location_at("cache.conf", 4, 2)
            .category("configuration")?
            .group_id("caching")?
            .solution("fix the directory permissions")
            .severity(Severity::Error))
    });

    assert_eq!(error.to_string(), "cache directory is not writable");

    let events = sink.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].group, "caching");
    assert_eq!(events[0].doc_link.as_deref(), Some("https://docs.example/caching"));
    assert_eq!(events[0].path.as_deref(), Some("cache.conf"));
    assert_eq!(events[0].column, Some(2));
}

#[test]
fn rethrow_keeps_original_failure_and_attaches_problem() {
    let (reporter, sink) = reporter_with_sink();
    let _operation = Operation::start("execute task");

    let error = reporter.rethrowing(anyhow!("disk full"), |builder| {
        Ok(builder
            .message("task failed while writing outputs")?
            .undocumented()
            .no_location()
            .category("execution")?
            .group_id(foghorn::group::GENERIC_ID)?)
    });

    // The raised error is the original failure, with the problem attached.
    assert_eq!(error.to_string(), "disk full");
    let problem = error.problem().expect("problem was built");
    assert!(Arc::ptr_eq(error.cause().unwrap(), problem.cause().unwrap()));

    // Delivery happened before the error was handed back.
    assert_eq!(sink.take().len(), 1);
}

#[test]
fn definition_errors_surface_instead_of_problems() {
    let (reporter, sink) = reporter_with_sink();
    let _operation = Operation::start("misuse");

    let error = reporter.throwing(|builder| {
        Ok(builder
            .message("   ")?
            .undocumented()
            .no_location()
            .category("validation")?
            .group_id(foghorn::group::GENERIC_ID)?)
    });

    assert!(matches!(error, ProblemError::Definition(_)));
    assert!(sink.events().is_empty());
}

#[test]
fn delegating_wrapper_is_transparent_to_callers() {
    let (reporter, sink) = reporter_with_sink();
    let _operation = Operation::start("wrapped build");

    let problem = Delegating::new(reporter.create_builder())
        .message("deprecated task property")
        .unwrap()
        .documented_at("https://docs.example/deprecations")
        .no_location()
        .category("task_property")
        .unwrap()
        .group_id(foghorn::group::DEPRECATION_ID)
        .unwrap()
        .severity(Severity::Warning)
        .build()
        .unwrap();

    problem.report();

    let events = sink.take();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].problem_id, "deprecation:task_property");
    assert_eq!(events[0].severity, "warning");
}

#[test]
fn group_reconstruction_round_trip() {
    let reporter = ProblemReporter::default();

    // A worker process sends back a flattened group.
    let wire = r#"{"id":"worker_validation"}"#;
    let rebuilt: ProblemGroup = serde_json::from_str(wire).unwrap();

    // It must be re-registered before use against a live registry.
    let registered = reporter.register_group_value(rebuilt.clone()).unwrap();
    assert_eq!(registered, rebuilt);
    assert!(reporter.register_group_value(rebuilt).is_err());
}

#[test]
fn json_line_sink_emits_machine_readable_problems() {
    let sink = Arc::new(JsonLineSink::new(Vec::new()));
    let reporter = ProblemReporter::new(sink.clone());

    let _operation = Operation::start("emit json");
    let problem = reporter
        .create_builder()
        .message("unresolved version catalog alias")
        .unwrap()
        .undocumented()
        .location("gradle/libs.versions.toml", 17)
        .category("alias")
        .unwrap()
        .group_id(foghorn::group::VERSION_CATALOG_ID)
        .unwrap()
        .build()
        .unwrap();
    reporter.collect(&problem);

    // The built problem holds its own sink reference; release everything
    // before unwrapping the writer.
    drop(problem);
    drop(reporter);
    let sink = Arc::into_inner(sink).expect("sole sink owner remains");
    let output = String::from_utf8(sink.into_inner()).unwrap();
    let line = output.lines().next().unwrap();
    let value: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(value["problem_id"], "version_catalog:alias");
    assert_eq!(value["line"], 17);
}
