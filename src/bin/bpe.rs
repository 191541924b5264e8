use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as AnyhowContext, Result, anyhow};
use bpe::compiler::core::Compiler;
use bpe::compiler::loader;
use bpe::config::EngineConfig;
use bpe::runtime::engine::Engine;
use bpe::runtime::graph::{NodeId, ProcessGraph};
use bpe::runtime::instance::InstanceId;
use bpe::runtime::query;
use bpe::runtime::scheduler::TimeoutJob;
use bpe::runtime::storage::ExecutionStore;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an instance and advance it until it is stable
    Run {
        /// Path to the collaboration YAML file
        file: PathBuf,

        /// Start event id; defaults to the first manual start event
        #[arg(long)]
        start: Option<String>,

        /// Initial variable, `name=value` (value parsed as JSON when possible)
        #[arg(short = 'D', long = "var", value_parser = parse_var)]
        vars: Vec<(String, Value)>,

        /// Engine configuration YAML file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overrides `max_update_steps` of the configuration
        #[arg(long)]
        max_steps: Option<usize>,
    },
    /// Load and validate a collaboration without running it
    Check {
        file: PathBuf,
    },
    /// Start an instance and keep firing timers until every instance is done
    Watch {
        file: PathBuf,

        #[arg(long)]
        start: Option<String>,

        #[arg(short = 'D', long = "var", value_parser = parse_var)]
        vars: Vec<(String, Value)>,

        /// Timeout check period in milliseconds
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            start,
            vars,
            config,
            max_steps,
        } => {
            let mut config = match config {
                Some(path) => EngineConfig::from_yaml_file(path)?,
                None => EngineConfig::default(),
            };
            if let Some(steps) = max_steps {
                config.max_update_steps = steps;
            }

            let graph = compile(&file)?;
            let start = pick_start(&graph, start.as_deref())?;
            let engine = Engine::new(config);
            let mut store = ExecutionStore::new();
            let id = store.transaction(|store| {
                engine.create_instance(store, &graph, start, vars.into_iter().collect::<Map<_, _>>())
            })?;

            println!("{}", serde_json::to_string_pretty(&report(&store, id)?)?);
        }
        Commands::Check { file } => {
            let graph = compile(&file)?;
            let starts = query::manual_start_events(&graph).unwrap_or_default();
            println!(
                "{}: {} process(es), {} node(s), {} message flow(s), {} manual start event(s)",
                graph.id,
                graph.processes().len(),
                graph.nodes().len(),
                graph.message_flows().count(),
                starts.len()
            );
        }
        Commands::Watch {
            file,
            start,
            vars,
            interval_ms,
        } => {
            let graph = compile(&file)?;
            let start = pick_start(&graph, start.as_deref())?;
            let engine = Arc::new(Engine::default());
            let mut store = ExecutionStore::new();
            let id = store.transaction(|store| {
                engine.create_instance(store, &graph, start, vars.into_iter().collect::<Map<_, _>>())
            })?;
            info!(instance_id = %id, "Watching instance");

            let period = Duration::from_millis(interval_ms);
            let store = Arc::new(Mutex::new(store));
            let job = TimeoutJob::new(engine, store.clone(), period);
            let done = all_finished(store.clone(), period);
            job.run(async {
                tokio::select! {
                    _ = done => {}
                    _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                }
            })
            .await?;

            let store = store.lock().await;
            println!("{}", serde_json::to_string_pretty(&report(&store, id)?)?);
        }
    }

    Ok(())
}

fn compile(file: &Path) -> Result<Arc<ProcessGraph>> {
    info!("Loading collaboration from: {:?}", file);
    let collaboration = loader::load_collaboration_from_yaml(file)?;

    let mut compiler = Compiler::new();
    let graph = compiler
        .compile(collaboration)
        .with_context(|| format!("Failed to compile {}", file.display()))?;
    info!("Compiled graph '{}' with {} nodes.", graph.id, graph.nodes().len());
    Ok(Arc::new(graph))
}

fn pick_start(graph: &ProcessGraph, start: Option<&str>) -> Result<NodeId> {
    match start {
        Some(key) => graph
            .node_by_key(key)
            .ok_or_else(|| anyhow!("Unknown start event: {}", key)),
        None => Ok(query::manual_start_events(graph)?[0]),
    }
}

fn parse_var(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.trim().to_string(), value))
}

async fn all_finished(store: Arc<Mutex<ExecutionStore>>, period: Duration) {
    loop {
        tokio::time::sleep(period).await;
        if store.lock().await.live_instances().is_empty() {
            return;
        }
    }
}

fn report(store: &ExecutionStore, id: InstanceId) -> Result<Value> {
    let instance = store.instance(id)?;
    let mut active = Vec::new();
    for token in instance.active_tokens() {
        let token = store.token(*token)?;
        active.push(json!({
            "token": token.id,
            "node": instance.graph.node(token.node).key,
            "since": token.created_at,
        }));
    }
    Ok(json!({
        "instance": instance.id,
        "process": instance.process_name(),
        "state": instance.state,
        "active_tokens": active,
        "tokens_created": instance.all_tokens().len(),
        "variables": instance.variables,
    }))
}
