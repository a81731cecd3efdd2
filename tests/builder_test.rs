use prozess::error::GraphError;
use prozess::graph::NodeKind;
use prozess::graph::builder::GraphBuilder;

#[test]
fn test_duplicate_node_id_is_rejected() {
    let err = GraphBuilder::new("bad")
        .start_event("begin")
        .user_task("work")
        .user_task("work")
        .end_event("finish")
        .build()
        .expect_err("Duplicate node must fail");
    assert!(matches!(err, GraphError::DuplicateNode(id) if id == "work"));
}

#[test]
fn test_flow_to_unknown_node_is_rejected() {
    let err = GraphBuilder::new("bad")
        .start_event("begin")
        .end_event("finish")
        .flow("f1", "begin", "ghost")
        .build()
        .expect_err("Unknown node must fail");
    assert!(
        matches!(err, GraphError::UnknownNode { flow, node } if flow == "f1" && node == "ghost")
    );
}

#[test]
fn test_duplicate_flow_id_is_rejected() {
    let err = GraphBuilder::new("bad")
        .start_event("begin")
        .user_task("a")
        .user_task("b")
        .end_event("finish")
        .flow("f1", "begin", "a")
        .flow("f1", "begin", "b")
        .flow("f2", "a", "finish")
        .flow("f3", "b", "finish")
        .build()
        .expect_err("Duplicate flow must fail");
    assert!(matches!(err, GraphError::DuplicateFlow { flow, .. } if flow == "f1"));
}

#[test]
fn test_exactly_one_start_event_is_required() {
    let err = GraphBuilder::new("bad")
        .user_task("work")
        .end_event("finish")
        .flow("f1", "work", "finish")
        .build()
        .expect_err("Missing start must fail");
    assert!(matches!(err, GraphError::StartCount(_)));

    let err = GraphBuilder::new("bad")
        .start_event("one")
        .start_event("two")
        .end_event("finish")
        .flow("f1", "one", "finish")
        .build()
        .expect_err("Two starts must fail");
    assert!(matches!(err, GraphError::StartCount(_)));
}

#[test]
fn test_flow_reusing_start_event_id_is_rejected() {
    // "begin" names the root task in saved workflow states, so a flow
    // called "begin" would be unresolvable on restore
    let err = GraphBuilder::new("bad")
        .start_event("begin")
        .user_task("a")
        .user_task("b")
        .end_event("finish")
        .flow("f1", "begin", "a")
        .flow("begin", "a", "b")
        .flow("f2", "b", "finish")
        .build()
        .expect_err("Flow named after the start event must fail");
    assert!(matches!(err, GraphError::StartIdReused(id) if id == "begin"));
}

#[test]
fn test_end_event_with_outgoing_is_rejected() {
    let err = GraphBuilder::new("bad")
        .start_event("begin")
        .end_event("finish")
        .user_task("after")
        .flow("f1", "begin", "finish")
        .flow("f2", "finish", "after")
        .build()
        .expect_err("Outgoing from end must fail");
    assert!(matches!(err, GraphError::EndWithOutgoing(node) if node == "finish"));
}

#[test]
fn test_condition_outside_gateway_is_rejected() {
    let err = GraphBuilder::new("bad")
        .start_event("begin")
        .user_task("work")
        .end_event("finish")
        .flow_if("f1", "begin", "work", "x > 1")
        .flow("f2", "work", "finish")
        .build()
        .expect_err("Condition on plain flow must fail");
    assert!(matches!(err, GraphError::MisplacedCondition { flow } if flow == "f1"));
}

#[test]
fn test_reserved_characters_are_rejected() {
    let err = GraphBuilder::new("bad")
        .start_event("begin")
        .user_task("work:unit")
        .end_event("finish")
        .build()
        .expect_err("Colon in id must fail");
    assert!(matches!(err, GraphError::ReservedChars(_)));
}

#[test]
fn test_flow_into_boundary_event_is_rejected() {
    let err = GraphBuilder::new("bad")
        .start_event("begin")
        .user_task("pay")
        .boundary_timer("late", "pay", 1000)
        .end_event("finish")
        .flow("f1", "begin", "pay")
        .flow("f2", "begin", "late")
        .flow("f3", "pay", "finish")
        .flow("f4", "late", "finish")
        .build()
        .expect_err("Flow into boundary event must fail");
    assert!(matches!(err, GraphError::FlowIntoBoundary { flow, .. } if flow == "f2"));
}

#[test]
fn test_boundary_event_needs_activity_host() {
    let err = GraphBuilder::new("bad")
        .start_event("begin")
        .exclusive_gateway("route")
        .boundary_timer("late", "route", 1000)
        .end_event("finish")
        .flow("f1", "begin", "route")
        .flow("f2", "route", "finish")
        .flow("f3", "late", "finish")
        .build()
        .expect_err("Gateway host must fail");
    assert!(matches!(err, GraphError::InvalidBoundaryHost { host, .. } if host == "route"));
}

#[test]
fn test_boundary_splice_shape() {
    let graph = GraphBuilder::new("payment")
        .start_event("begin")
        .user_task("pay")
        .boundary_timer("late", "pay", 1000)
        .boundary_message("abort", "pay", "order-cancelled")
        .user_task("remind")
        .user_task("restock")
        .end_event("finish")
        .flow("f1", "begin", "pay")
        .flow("f2", "pay", "finish")
        .flow("f3", "late", "remind")
        .flow("f4", "abort", "restock")
        .flow("f5", "remind", "finish")
        .flow("f6", "restock", "finish")
        .build()
        .expect("Failed to build process");

    // One synthetic split per host, fanning out to host and events
    let split = graph.node_index("pay.attached").expect("Split node missing");
    assert!(matches!(graph.node(split).kind, NodeKind::BoundarySplit));

    let targets: Vec<&str> =
        graph.node(split).outgoing.iter().map(|t| graph.node(t.target).id.as_str()).collect();
    assert_eq!(targets, vec!["pay", "late", "abort"]);

    // The original flow into the host now enters the split
    let begin = graph.node_index("begin").unwrap();
    assert_eq!(graph.node(begin).outgoing[0].target, split);

    // Synthetic flow ids mirror their target node ids
    let ids: Vec<&str> = graph.node(split).outgoing.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["pay", "late", "abort"]);
}
