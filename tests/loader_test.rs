use bpe::compiler::core::Compiler;
use bpe::compiler::loader;
use bpe::config::EngineConfig;
use bpe::dsl::{EventDefinition, NodeType};
use bpe::runtime::engine::Engine;
use bpe::runtime::instance::ExecutionState;
use bpe::runtime::storage::ExecutionStore;
use serde_json::{Map, json};
use std::fs;
use std::sync::Arc;

const ORDER_YAML: &str = r#"
id: "shop"
name: "Shop"
processes:
  - id: "order"
    name: "Order handling"
    variables:
      amount: 120
    lanes:
      - id: "clerks"
        name: "Clerks"
        actor_rule: "\"clerk\""
        nodes: ["review"]
    nodes:
      - id: "start"
        type: "StartEvent"
      - id: "check"
        type: "ExclusiveGateway"
        automatic: true
        default_flow: "small"
      - id: "review"
        type: "ManualTask"
        name: "Review large order"
      - id: "reminder"
        type: "BoundaryEvent"
        attached_to: "review"
        cancel_activity: false
        definition:
          kind: "Timer"
          delay_ms: 60000
      - id: "approve"
        type: "ServiceTask"
        action: "${approved = true}"
      - id: "end"
        type: "EndEvent"
    edges:
      - source: "start"
        target: "check"
      - source: "check"
        target: "review"
        condition: "${amount > 100}"
      - id: "small"
        source: "check"
        target: "approve"
      - source: "review"
        target: "approve"
      - source: "approve"
        target: "end"
"#;

#[test]
fn test_load_collaboration_from_yaml_file() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("order.yaml");
    fs::write(&file_path, ORDER_YAML).expect("Failed to write YAML file");

    let collaboration = loader::load_collaboration_from_yaml(&file_path).expect("Failed to load YAML");

    assert_eq!(collaboration.id, "shop");
    assert_eq!(collaboration.processes.len(), 1);
    let process = &collaboration.processes[0];
    assert_eq!(process.variables.get("amount"), Some(&json!(120)));
    assert_eq!(process.nodes.len(), 6);
    assert_eq!(process.edges.len(), 5);
    assert_eq!(process.lanes[0].nodes, vec!["review".to_string()]);

    let reminder = process.nodes.iter().find(|n| n.id == "reminder").unwrap();
    assert_eq!(
        reminder.kind,
        NodeType::BoundaryEvent {
            attached_to: "review".to_string(),
            definition: Some(EventDefinition::Timer { delay_ms: 60000 }),
            cancel_activity: false,
        }
    );
    let review = process.nodes.iter().find(|n| n.id == "review").unwrap();
    assert_eq!(review.name.as_deref(), Some("Review large order"));
}

#[test]
fn test_loaded_collaboration_runs() {
    let collaboration = loader::parse_collaboration(ORDER_YAML).expect("Failed to parse YAML");
    let graph = Arc::new(Compiler::new().compile(collaboration).expect("Compilation failed"));
    let engine = Engine::default();
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();

    // Large order waits for review, together with the reminder timer.
    let large = store
        .transaction(|store| engine.create_instance(store, &graph, start, Map::new()))
        .expect("Instance creation failed");
    let instance = store.instance(large).unwrap();
    let nodes: Vec<_> = instance
        .active_tokens()
        .iter()
        .map(|t| graph.node(store.token(*t).unwrap().node).key.clone())
        .collect();
    assert_eq!(nodes.len(), 2);
    assert!(nodes.contains(&"review".to_string()));
    assert!(nodes.contains(&"reminder".to_string()));

    // Small order takes the default flow straight to the end.
    let mut vars = Map::new();
    vars.insert("amount".to_string(), json!(10));
    let small = store
        .transaction(|store| engine.create_instance(store, &graph, start, vars))
        .expect("Instance creation failed");
    let instance = store.instance(small).unwrap();
    assert_eq!(instance.state, ExecutionState::Finished);
    assert_eq!(instance.var("approved"), Some(&json!(true)));
}

#[test]
fn test_missing_file_reports_path() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("missing.yaml");

    let err = loader::load_collaboration_from_yaml(&file_path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to read YAML file"));
}

#[test]
fn test_invalid_yaml_reports_path() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("broken.yaml");
    fs::write(&file_path, "id: [unclosed").expect("Failed to write YAML file");

    let err = loader::load_collaboration_from_yaml(&file_path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to deserialize YAML content"));
}

#[test]
fn test_engine_config_from_yaml() {
    let config = EngineConfig::from_yaml_str("max_update_steps: 5").expect("Failed to parse config");
    assert_eq!(config.max_update_steps, 5);
    assert_eq!(config.max_batch_rounds, EngineConfig::default().max_batch_rounds);

    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let file_path = temp_dir.path().join("engine.yaml");
    fs::write(&file_path, "max_batch_rounds: 7\n").expect("Failed to write config");
    let config = EngineConfig::from_yaml_file(&file_path).expect("Failed to load config");
    assert_eq!(config.max_batch_rounds, 7);
    assert_eq!(config.max_update_steps, 1000);
}
