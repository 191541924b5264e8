use bpe::compiler::core::Compiler;
use bpe::config::EngineConfig;
use bpe::dsl::Collaboration;
use bpe::dsl::builder::{CollaborationBuilder, ProcessBuilder};
use bpe::error::EngineError;
use bpe::runtime::context::ManualSession;
use bpe::runtime::engine::Engine;
use bpe::runtime::graph::ProcessGraph;
use bpe::runtime::scheduler::TimeoutJob;
use bpe::runtime::storage::ExecutionStore;
use chrono::{TimeDelta, TimeZone, Utc};
use serde_json::Map;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn compile(collaboration: Collaboration) -> Arc<ProcessGraph> {
    Arc::new(Compiler::new().compile(collaboration).expect("Compilation failed"))
}

fn reminder_process() -> Arc<ProcessGraph> {
    compile(
        CollaborationBuilder::new("c")
            .process(
                ProcessBuilder::new("p")
                    .start("start")
                    .manual_task("review")
                    .boundary_timer("late", "review", 30_000, true)
                    .end("timed_out")
                    .connect("start", "review")
                    .connect("late", "timed_out")
                    .build(),
            )
            .build(),
    )
}

#[tokio::test]
async fn test_tick_fires_expired_timers() {
    let graph = reminder_process();
    let session = Arc::new(ManualSession::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
    let engine = Arc::new(Engine::default().with_session(session.clone()));
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();
    let id = engine.create_instance(&mut store, &graph, start, Map::new()).unwrap();

    let store = Arc::new(Mutex::new(store));
    let job = TimeoutJob::new(engine.clone(), store.clone(), Duration::from_millis(10));

    job.tick().await.unwrap();
    assert!(store.lock().await.instance(id).unwrap().is_running());

    session.advance(TimeDelta::seconds(30));
    job.tick().await.unwrap();
    assert!(!store.lock().await.instance(id).unwrap().is_running());
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let graph = reminder_process();
    let engine = Arc::new(Engine::default());
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();
    engine.create_instance(&mut store, &graph, start, Map::new()).unwrap();

    let job = TimeoutJob::new(engine, Arc::new(Mutex::new(store)), Duration::from_millis(5));
    let result = job.run(tokio::time::sleep(Duration::from_millis(50))).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_run_aborts_on_fatal_error() {
    let graph = compile(
        CollaborationBuilder::new("c")
            .process(
                ProcessBuilder::new("p")
                    .start("start")
                    .service_task("ping")
                    .service_task("pong")
                    .connect("start", "ping")
                    .connect("ping", "pong")
                    .connect("pong", "ping")
                    .build(),
            )
            .build(),
    );
    let config = EngineConfig {
        max_update_steps: 20,
        ..EngineConfig::default()
    };
    let engine = Arc::new(Engine::new(config));
    let mut store = ExecutionStore::new();
    let start = graph.node_by_key("start").unwrap();

    // Placed but not yet run, so the loop only shows up in the job.
    let instance = engine.factory().create(&graph, start, engine.session().now()).unwrap();
    let id = store.insert_instance(instance);
    engine.place_start_tokens(&mut store, id, start).unwrap();
    let tokens_before = store.tokens().len();

    let store = Arc::new(Mutex::new(store));
    let job = TimeoutJob::new(engine, store.clone(), Duration::from_millis(5));
    let result = job.run(tokio::time::sleep(Duration::from_secs(5))).await;

    assert!(matches!(result, Err(EngineError::StepLimitExceeded { limit: 20, .. })));
    assert_eq!(store.lock().await.tokens().len(), tokens_before);
}

#[tokio::test]
async fn test_zero_period_is_raised() {
    let job = TimeoutJob::new(
        Arc::new(Engine::default()),
        Arc::new(Mutex::new(ExecutionStore::new())),
        Duration::ZERO,
    );
    assert_eq!(job.period(), Duration::from_millis(1));

    let result = job.run(tokio::time::sleep(Duration::from_millis(20))).await;
    assert!(result.is_ok());
}
