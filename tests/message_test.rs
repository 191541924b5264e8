use bpe::compiler::core::Compiler;
use bpe::config::EngineConfig;
use bpe::dsl::Collaboration;
use bpe::dsl::builder::{CollaborationBuilder, ProcessBuilder};
use bpe::error::EngineError;
use bpe::runtime::engine::Engine;
use bpe::runtime::graph::ProcessGraph;
use bpe::runtime::instance::{ExecutionState, InstanceId};
use bpe::runtime::storage::ExecutionStore;
use serde_json::{Map, json};
use std::sync::Arc;

fn compile(collaboration: Collaboration) -> Arc<ProcessGraph> {
    Arc::new(Compiler::new().compile(collaboration).expect("Compilation failed"))
}

fn active_nodes(store: &ExecutionStore, id: InstanceId) -> Vec<String> {
    let instance = store.instance(id).unwrap();
    let mut nodes: Vec<String> = instance
        .active_tokens()
        .iter()
        .map(|t| instance.graph.node(store.token(*t).unwrap().node).key.clone())
        .collect();
    nodes.sort();
    nodes
}

fn order_and_invoice() -> Arc<ProcessGraph> {
    compile(
        CollaborationBuilder::new("shop")
            .process(
                ProcessBuilder::new("order")
                    .var("total", 99)
                    .start("start")
                    .message_throw("request_invoice")
                    .manual_task("ship")
                    .connect("start", "request_invoice")
                    .connect("request_invoice", "ship")
                    .build(),
            )
            .process(
                ProcessBuilder::new("invoice")
                    .message_start("invoice_requested")
                    .manual_task("bill")
                    .connect("invoice_requested", "bill")
                    .build(),
            )
            .message_flow_with_connect(
                "request_invoice",
                "invoice_requested",
                "target.order = instance_id; target.amount = total; invoiced = true",
            )
            .build(),
    )
}

#[test]
fn test_message_spawns_one_instance() {
    let graph = order_and_invoice();
    let engine = Engine::default();
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();

    let order = store
        .transaction(|store| engine.create_instance(store, &graph, start, Map::new()))
        .expect("Instance creation failed");
    assert_eq!(active_nodes(&store, order), vec!["ship".to_string()]);
    assert_eq!(store.instances().count(), 2);

    let invoice = store
        .instances()
        .find(|i| i.id != order)
        .map(|i| i.id)
        .expect("spawned instance");
    assert_eq!(store.instance(invoice).unwrap().process_name(), "invoice");
    // Placed, not yet advanced.
    assert_eq!(active_nodes(&store, invoice), vec!["invoice_requested".to_string()]);

    store
        .transaction(|store| engine.update_all(store))
        .expect("Batch update failed");
    assert_eq!(active_nodes(&store, invoice), vec!["bill".to_string()]);
    assert_eq!(store.instances().count(), 2);

    // The connect expression linked both instances.
    let spawned = store.instance(invoice).unwrap();
    assert_eq!(spawned.var("order"), Some(&json!(order.to_string())));
    assert_eq!(spawned.var("amount"), Some(&json!(99)));
    assert_eq!(store.instance(order).unwrap().var("invoiced"), Some(&json!(true)));
}

#[test]
fn test_missing_message_flow_is_an_error() {
    let graph = compile(
        CollaborationBuilder::new("c")
            .process(
                ProcessBuilder::new("p")
                    .start("start")
                    .message_throw("shout")
                    .connect("start", "shout")
                    .build(),
            )
            .build(),
    );
    let engine = Engine::default();
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();

    let err = store
        .transaction(|store| engine.create_instance(store, &graph, start, Map::new()))
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingMessageFlow(ref key) if key == "shout"));
    assert!(!err.is_fatal());
    assert_eq!(store.instances().count(), 0);
}

#[test]
fn test_throw_event_without_definition_passes_through() {
    let graph = compile(
        CollaborationBuilder::new("c")
            .process(
                ProcessBuilder::new("p")
                    .start("start")
                    .intermediate_event("milestone")
                    .end("end")
                    .connect("start", "milestone")
                    .connect("milestone", "end")
                    .build(),
            )
            .build(),
    );
    let engine = Engine::default();
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();

    let id = engine.create_instance(&mut store, &graph, start, Map::new()).unwrap();
    assert_eq!(store.instance(id).unwrap().state, ExecutionState::Finished);
    assert_eq!(store.instances().count(), 1);
}

#[test]
fn test_runaway_spawning_hits_round_limit() {
    let graph = compile(
        CollaborationBuilder::new("c")
            .process(
                ProcessBuilder::new("chain")
                    .start("start")
                    .message_start("again")
                    .message_throw("spawn")
                    .end("end")
                    .connect("start", "spawn")
                    .connect("again", "spawn")
                    .connect("spawn", "end")
                    .build(),
            )
            .message_flow("spawn", "again")
            .build(),
    );
    let config = EngineConfig {
        max_batch_rounds: 5,
        ..EngineConfig::default()
    };
    let engine = Engine::new(config);
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();

    store
        .transaction(|store| engine.create_instance(store, &graph, start, Map::new()))
        .expect("Instance creation failed");
    assert_eq!(store.instances().count(), 2);

    let err = store.transaction(|store| engine.update_all(store)).unwrap_err();
    assert!(matches!(err, EngineError::RoundLimitExceeded { limit: 5 }));
    assert!(err.is_fatal());
    // Rolled back to the state before the batch.
    assert_eq!(store.instances().count(), 2);
    assert_eq!(store.live_instances().len(), 1);
}
