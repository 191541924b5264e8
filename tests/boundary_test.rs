use bpe::compiler::core::Compiler;
use bpe::dsl::Collaboration;
use bpe::dsl::builder::{CollaborationBuilder, ProcessBuilder};
use bpe::runtime::context::{Actor, ManualSession};
use bpe::runtime::engine::Engine;
use bpe::runtime::graph::ProcessGraph;
use bpe::runtime::instance::{ExecutionState, InstanceId};
use bpe::runtime::storage::ExecutionStore;
use chrono::{TimeDelta, TimeZone, Utc};
use serde_json::{Map, json};
use std::sync::Arc;

fn compile(collaboration: Collaboration) -> Arc<ProcessGraph> {
    Arc::new(Compiler::new().compile(collaboration).expect("Compilation failed"))
}

fn setup() -> (Engine, Arc<ManualSession>) {
    let session = Arc::new(ManualSession::new(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()));
    let engine = Engine::default().with_session(session.clone());
    (engine, session)
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

fn review_process(cancel_activity: bool) -> Arc<ProcessGraph> {
    compile(
        CollaborationBuilder::new("c")
            .process(
                ProcessBuilder::new("p")
                    .start("start")
                    .manual_task("review")
                    .boundary_timer("late", "review", 1000, cancel_activity)
                    .manual_task("escalate")
                    .end("end")
                    .connect("start", "review")
                    .connect("review", "end")
                    .connect("late", "escalate")
                    .build(),
            )
            .build(),
    )
}

#[test]
fn test_interrupting_timer_cancels_task() {
    let graph = review_process(true);
    let (engine, session) = setup();
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();
    let id = engine.create_instance(&mut store, &graph, start, Map::new()).unwrap();
    assert_eq!(active_nodes(&store, id), vec!["late".to_string(), "review".to_string()]);

    // Not yet due
    session.advance(TimeDelta::milliseconds(500));
    engine.update_all(&mut store).unwrap();
    assert_eq!(active_nodes(&store, id), vec!["late".to_string(), "review".to_string()]);

    // Due
    session.advance(TimeDelta::milliseconds(500));
    engine.update_all(&mut store).unwrap();
    assert_eq!(active_nodes(&store, id), vec!["escalate".to_string()]);

    let review = graph.node_by_key("review").unwrap();
    let late = graph.node_by_key("late").unwrap();
    let instance = store.instance(id).unwrap();
    let review_token = instance
        .all_tokens()
        .iter()
        .map(|t| store.token(*t).unwrap())
        .find(|t| t.node == review)
        .unwrap();
    assert!(!review_token.active);
    assert_eq!(review_token.finished_at, Some(engine.session().now()));

    // The boundary token descends from the task token.
    let late_token = instance
        .all_tokens()
        .iter()
        .map(|t| store.token(*t).unwrap())
        .find(|t| t.node == late)
        .unwrap();
    assert!(late_token.previous.contains(&review_token.id));
}

#[test]
fn test_non_interrupting_timer_keeps_task() {
    let graph = review_process(false);
    let (engine, session) = setup();
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();
    let id = engine.create_instance(&mut store, &graph, start, Map::new()).unwrap();

    session.advance(TimeDelta::seconds(2));
    engine.update_all(&mut store).unwrap();
    assert_eq!(active_nodes(&store, id), vec!["escalate".to_string(), "review".to_string()]);
}

#[test]
fn test_boundary_token_ends_with_its_task() {
    let graph = review_process(true);
    let (engine, session) = setup();
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();
    let id = engine.create_instance(&mut store, &graph, start, Map::new()).unwrap();

    session.set_actor(Some(Actor::new("alice")));
    let review = graph.node_by_key("review").unwrap();
    let token = *store.tokens_at(id, review).unwrap().iter().next().unwrap();
    let edge = graph.single_outgoing_edge(review).unwrap().unwrap();
    engine.execute_path(&mut store, token, &[edge], json!(null)).unwrap();

    let instance = store.instance(id).unwrap();
    assert_eq!(instance.state, ExecutionState::Finished);
    assert!(instance.active_tokens().is_empty());
    assert_eq!(store.token(token).unwrap().finished_by, Some(Actor::new("alice")));

    // A timer firing later finds nothing to do.
    session.advance(TimeDelta::seconds(5));
    engine.update_all(&mut store).unwrap();
    assert!(store.instance(id).unwrap().active_tokens().is_empty());
}

#[test]
fn test_boundary_token_retires_when_task_moves_on() {
    let graph = compile(
        CollaborationBuilder::new("c")
            .process(
                ProcessBuilder::new("p")
                    .start("start")
                    .manual_task("review")
                    .boundary_timer("late", "review", 1000, true)
                    .manual_task("archive")
                    .manual_task("escalate")
                    .connect("start", "review")
                    .connect("review", "archive")
                    .connect("late", "escalate")
                    .build(),
            )
            .build(),
    );
    let (engine, _session) = setup();
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();
    let id = engine.create_instance(&mut store, &graph, start, Map::new()).unwrap();

    let review = graph.node_by_key("review").unwrap();
    let token = *store.tokens_at(id, review).unwrap().iter().next().unwrap();
    let edge = graph.single_outgoing_edge(review).unwrap().unwrap();
    engine.execute_path(&mut store, token, &[edge], json!(null)).unwrap();

    assert_eq!(active_nodes(&store, id), vec!["archive".to_string()]);
}

#[test]
fn test_timer_start_event_waits_for_delay() {
    let graph = compile(
        CollaborationBuilder::new("c")
            .process(
                ProcessBuilder::new("p")
                    .start("start")
                    .timer_start("deadline", 60_000)
                    .manual_task("work")
                    .end("expired")
                    .connect("start", "work")
                    .connect("deadline", "expired")
                    .build(),
            )
            .build(),
    );
    let (engine, session) = setup();
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();
    let id = engine.create_instance(&mut store, &graph, start, Map::new()).unwrap();
    assert_eq!(active_nodes(&store, id), vec!["deadline".to_string(), "work".to_string()]);

    session.advance(TimeDelta::seconds(59));
    engine.update_all(&mut store).unwrap();
    assert!(store.instance(id).unwrap().is_running());

    session.advance(TimeDelta::seconds(1));
    engine.update_all(&mut store).unwrap();
    let instance = store.instance(id).unwrap();
    assert_eq!(instance.state, ExecutionState::Finished);
    assert!(instance.active_tokens().is_empty());
}
