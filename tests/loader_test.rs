use prozess::loader::{FileSetResolver, ProcessSet};
use prozess::runtime::task::DataMap;
use prozess::runtime::workflow::{EngineServices, Workflow};
use std::fs;
use std::sync::Arc;
use serde_json::json;

#[test]
fn test_load_and_run_simple_yaml_process() {
    let yaml_content = r#"
processes:
  - id: "hello"
    nodes:
      - id: "begin"
        type: "start"
      - id: "greet"
        type: "script_task"
        script: 'greeting = "hi"'
      - id: "finish"
        type: "end"
    flows:
      - id: "f1"
        from: "begin"
        to: "greet"
      - id: "f2"
        from: "greet"
        to: "finish"
"#;

    let set = Arc::new(ProcessSet::from_yaml(yaml_content).expect("Failed to load processes"));
    assert_eq!(set.ids(), vec!["hello"]);

    let mut workflow = set.start("hello").expect("Failed to start process");
    workflow.do_engine_steps().expect("Engine steps failed");

    assert!(workflow.is_completed());
    assert_eq!(workflow.data.get("greeting"), Some(&json!("hi")));
}

#[test]
fn test_conditional_flows_from_yaml() {
    let yaml_content = r#"
processes:
  - id: "triage"
    nodes:
      - id: "begin"
        type: "start"
      - id: "route"
        type: "exclusive_gateway"
      - id: "big"
        type: "user_task"
      - id: "small"
        type: "user_task"
      - id: "finish"
        type: "end"
    flows:
      - id: "f1"
        from: "begin"
        to: "route"
      - id: "to-big"
        from: "route"
        to: "big"
        condition: "amount > 100"
      - id: "to-small"
        from: "route"
        to: "small"
      - id: "f2"
        from: "big"
        to: "finish"
      - id: "f3"
        from: "small"
        to: "finish"
"#;

    let set = Arc::new(ProcessSet::from_yaml(yaml_content).expect("Failed to load processes"));
    let mut workflow = set.start("triage").expect("Failed to start process");
    workflow.set_data(DataMap::from([("amount".to_string(), json!(250))]));
    workflow.do_engine_steps().expect("Engine steps failed");

    let ready = workflow.get_ready_user_tasks();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].node, "big");
}

#[test]
fn test_call_between_processes_in_one_file() {
    let yaml_content = r#"
processes:
  - id: "main"
    nodes:
      - id: "begin"
        type: "start"
      - id: "pay"
        type: "call"
        calls: "charge"
        out:
          - from: "charged"
            to: "receipt"
      - id: "finish"
        type: "end"
    flows:
      - id: "s1"
        from: "begin"
        to: "pay"
      - id: "s2"
        from: "pay"
        to: "finish"
  - id: "charge"
    nodes:
      - id: "c-begin"
        type: "start"
      - id: "compute"
        type: "script_task"
        script: "charged = amount * 2"
      - id: "c-finish"
        type: "end"
    flows:
      - id: "c1"
        from: "c-begin"
        to: "compute"
      - id: "c2"
        from: "compute"
        to: "c-finish"
"#;

    let set = Arc::new(ProcessSet::from_yaml(yaml_content).expect("Failed to load processes"));
    assert_eq!(set.ids(), vec!["charge", "main"]);

    let mut workflow = set.start("main").expect("Failed to start process");
    workflow.set_data(DataMap::from([("amount".to_string(), json!(21))]));
    workflow.do_engine_steps().expect("Engine steps failed");

    assert!(workflow.is_completed());
    assert_eq!(workflow.data.get("receipt"), Some(&json!(42)));
}

#[test]
fn test_duplicate_process_id_is_rejected() {
    let yaml_content = r#"
processes:
  - id: "dup"
    nodes:
      - id: "begin"
        type: "start"
      - id: "finish"
        type: "end"
    flows:
      - id: "f1"
        from: "begin"
        to: "finish"
  - id: "dup"
    nodes:
      - id: "begin"
        type: "start"
      - id: "finish"
        type: "end"
    flows:
      - id: "f1"
        from: "begin"
        to: "finish"
"#;

    let err = ProcessSet::from_yaml(yaml_content).expect_err("Duplicate id must fail");
    assert!(err.to_string().contains("duplicate process id 'dup'"));
}

#[test]
fn test_unknown_node_type_is_rejected() {
    let yaml_content = r#"
processes:
  - id: "odd"
    nodes:
      - id: "begin"
        type: "quantum_task"
    flows: []
"#;

    let err = ProcessSet::from_yaml(yaml_content).expect_err("Unknown type must fail");
    assert!(err.to_string().contains("failed to deserialize"));
}

#[test]
fn test_invalid_graph_is_rejected_with_process_context() {
    let yaml_content = r#"
processes:
  - id: "dangling"
    nodes:
      - id: "begin"
        type: "start"
      - id: "finish"
        type: "end"
    flows:
      - id: "f1"
        from: "begin"
        to: "ghost"
"#;

    let err = ProcessSet::from_yaml(yaml_content).expect_err("Unknown flow target must fail");
    let chain = format!("{err:#}");
    assert!(chain.contains("invalid process 'dangling'"));
    assert!(chain.contains("unknown node 'ghost'"));
}

#[test]
fn test_file_set_resolver_loads_subprocess_files() {
    let main_yaml = r#"
processes:
  - id: "main"
    nodes:
      - id: "begin"
        type: "start"
      - id: "pay"
        type: "call"
        calls: "charge"
        out:
          - from: "charged"
            to: "receipt"
      - id: "finish"
        type: "end"
    flows:
      - id: "s1"
        from: "begin"
        to: "pay"
      - id: "s2"
        from: "pay"
        to: "finish"
"#;
    let charge_yaml = r#"
processes:
  - id: "charge"
    nodes:
      - id: "c-begin"
        type: "start"
      - id: "compute"
        type: "script_task"
        script: "charged = amount * 2"
      - id: "c-finish"
        type: "end"
    flows:
      - id: "c1"
        from: "c-begin"
        to: "compute"
      - id: "c2"
        from: "compute"
        to: "c-finish"
"#;

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(temp_dir.path().join("main.yaml"), main_yaml).expect("Failed to write temp file");
    fs::write(temp_dir.path().join("charge.yaml"), charge_yaml).expect("Failed to write temp file");

    let set = ProcessSet::from_file(&temp_dir.path().join("main.yaml"))
        .expect("Failed to load main file");
    let graph = set.get("main").expect("Process missing from set");

    let services = EngineServices {
        resolver: Arc::new(FileSetResolver::new(temp_dir.path())),
        ..EngineServices::default()
    };
    let mut workflow = Workflow::with_services(graph, services);
    workflow.set_data(DataMap::from([("amount".to_string(), json!(21))]));
    workflow.do_engine_steps().expect("Engine steps failed");

    assert!(workflow.is_completed());
    assert_eq!(workflow.data.get("receipt"), Some(&json!(42)));

    temp_dir.close().expect("Failed to close temp dir");
}
