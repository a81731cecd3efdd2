use prozess::error::EngineError;
use prozess::graph::builder::GraphBuilder;
use prozess::graph::{ProcessGraph, SubprocessResolver};
use prozess::runtime::task::DataMap;
use prozess::runtime::workflow::{EngineServices, Workflow};
use std::collections::HashMap;
use std::sync::Arc;
use serde_json::json;

struct MapResolver(HashMap<String, Arc<ProcessGraph>>);

impl SubprocessResolver for MapResolver {
    fn resolve(&self, name: &str) -> Result<Arc<ProcessGraph>, EngineError> {
        self.0
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnresolvedSubprocess(name.to_string()))
    }
}

fn charge_graph() -> Arc<ProcessGraph> {
    Arc::new(
        GraphBuilder::new("charge")
            .start_event("c-begin")
            .script_task("compute", "charged = amount * 2")
            .end_event("c-finish")
            .flow("c1", "c-begin", "compute")
            .flow("c2", "compute", "c-finish")
            .build()
            .expect("Failed to build subprocess"),
    )
}

#[test]
fn test_call_activity_runs_subprocess_and_assigns_out() {
    let graph = GraphBuilder::new("main")
        .start_event("begin")
        .call_activity("pay", charge_graph())
        .out("charged", "receipt")
        .build()
        .end_event("finish")
        .flow("s1", "begin", "pay")
        .flow("s2", "pay", "finish")
        .build()
        .expect("Failed to build process");

    let mut workflow = Workflow::new(Arc::new(graph));
    workflow.set_data(DataMap::from([("amount".to_string(), json!(21))]));
    workflow.do_engine_steps().expect("Engine steps failed");

    assert!(workflow.is_completed());
    // Only the declared variable comes back out
    assert_eq!(workflow.data.get("receipt"), Some(&json!(42)));
    assert_eq!(workflow.data.get("charged"), None);
}

#[test]
fn test_missing_out_source_is_skipped() {
    let graph = GraphBuilder::new("main")
        .start_event("begin")
        .call_activity("pay", charge_graph())
        .out("no-such-variable", "receipt")
        .build()
        .end_event("finish")
        .flow("s1", "begin", "pay")
        .flow("s2", "pay", "finish")
        .build()
        .expect("Failed to build process");

    let mut workflow = Workflow::new(Arc::new(graph));
    workflow.set_data(DataMap::from([("amount".to_string(), json!(21))]));
    workflow.do_engine_steps().expect("Engine steps failed");

    assert!(workflow.is_completed());
    assert_eq!(workflow.data.get("receipt"), None);
}

#[test]
fn test_nested_user_task_is_reachable_from_outside() {
    let sub = Arc::new(
        GraphBuilder::new("review")
            .start_event("r-begin")
            .user_task("inspect")
            .end_event("r-finish")
            .flow("r1", "r-begin", "inspect")
            .flow("r2", "inspect", "r-finish")
            .build()
            .expect("Failed to build subprocess"),
    );
    let graph = GraphBuilder::new("main")
        .start_event("begin")
        .call_activity("audit", sub)
        .build()
        .end_event("finish")
        .flow("s1", "begin", "audit")
        .flow("s2", "audit", "finish")
        .build()
        .expect("Failed to build process");

    let mut workflow = Workflow::new(Arc::new(graph));
    workflow.do_engine_steps().expect("Engine steps failed");

    // The nested task surfaces with its workflow chain
    let ready = workflow.get_ready_user_tasks();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].node, "inspect");
    assert_eq!(ready[0].workflow, vec!["main".to_string(), "audit".to_string()]);
    assert_eq!(workflow.get_waiting_tasks()[0].node, "audit");

    // Completing it through the outer workflow drains everything
    workflow.complete_task(ready[0].id, None).expect("Failed to complete task");
    workflow.do_engine_steps().expect("Engine steps failed");
    assert!(workflow.is_completed());
}

#[test]
fn test_named_call_recurses_until_guard_stops() {
    let graph = Arc::new(
        GraphBuilder::new("countdown")
            .start_event("begin")
            .script_task("dec", "n = n - 1")
            .exclusive_gateway("check")
            .call_named("again", "countdown")
            .out("n", "n")
            .build()
            .end_event("finish")
            .flow("s1", "begin", "dec")
            .flow("s2", "dec", "check")
            .flow_if("rec", "check", "again", "n > 0")
            .flow("fin", "check", "finish")
            .flow("done", "again", "finish")
            .build()
            .expect("Failed to build process"),
    );

    let mut registry = HashMap::new();
    registry.insert("countdown".to_string(), Arc::clone(&graph));
    let services =
        EngineServices { resolver: Arc::new(MapResolver(registry)), ..EngineServices::default() };

    let mut workflow = Workflow::with_services(graph, services);
    workflow.set_data(DataMap::from([("n".to_string(), json!(3))]));
    workflow.do_engine_steps().expect("Engine steps failed");

    assert!(workflow.is_completed());
    assert_eq!(workflow.data.get("n"), Some(&json!(0)));
}

#[test]
fn test_unresolvable_call_fails() {
    let graph = GraphBuilder::new("main")
        .start_event("begin")
        .call_named("broken", "ghost")
        .build()
        .end_event("finish")
        .flow("s1", "begin", "broken")
        .flow("s2", "broken", "finish")
        .build()
        .expect("Failed to build process");

    let mut workflow = Workflow::new(Arc::new(graph));
    let err = workflow.do_engine_steps().expect_err("Unknown subprocess must fail");
    match err {
        EngineError::UnresolvedSubprocess(name) => assert_eq!(name, "ghost"),
        other => panic!("Expected UnresolvedSubprocess, got {other:?}"),
    }
}
