use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::nodes::{self, Transition};
use crate::runtime::context::{Session, SystemSession};
use crate::runtime::graph::{EdgeId, EdgeKind, Expression, NodeId, NodeKind, ProcessGraph};
use crate::runtime::instance::InstanceId;
use crate::runtime::query;
use crate::runtime::storage::ExecutionStore;
use crate::runtime::token::TokenId;
use crate::services::factory::DefaultInstanceFactory;
use crate::services::notify::LogSender;
use crate::services::rules::EvalexprEvaluator;
use crate::services::{InstanceFactory, NotificationSender, RuleEvaluator, RuleScope};

/// Drives process instances forward until they are stable.
///
/// The engine holds no instance state itself; every operation works on the
/// [`ExecutionStore`] handed in by the caller, who is expected to wrap the
/// call in [`ExecutionStore::transaction`].
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    rules: Arc<dyn RuleEvaluator>,
    notifier: Arc<dyn NotificationSender>,
    factory: Arc<dyn InstanceFactory>,
    session: Arc<dyn Session>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            rules: Arc::new(EvalexprEvaluator::new()),
            notifier: Arc::new(LogSender),
            factory: Arc::new(DefaultInstanceFactory),
            session: Arc::new(SystemSession::default()),
        }
    }

    pub fn with_rule_evaluator(mut self, rules: Arc<dyn RuleEvaluator>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_notification_sender(mut self, notifier: Arc<dyn NotificationSender>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_instance_factory(mut self, factory: Arc<dyn InstanceFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = session;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> &Arc<dyn RuleEvaluator> {
        &self.rules
    }

    pub fn notifier(&self) -> &Arc<dyn NotificationSender> {
        &self.notifier
    }

    pub fn factory(&self) -> &Arc<dyn InstanceFactory> {
        &self.factory
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    /// Creates an instance of the process owning `start` and runs it.
    pub fn create_instance(
        &self,
        store: &mut ExecutionStore,
        graph: &Arc<ProcessGraph>,
        start: NodeId,
        variables: Map<String, Value>,
    ) -> EngineResult<InstanceId> {
        ensure_start_event(graph, start)?;
        let mut instance = self.factory.create(graph, start, self.session.now())?;
        instance.variables.extend(variables);
        let id = store.insert_instance(instance);
        info!(instance_id = %id, start = %graph.node(start), "Process instance created");
        self.init(store, id, start)?;
        Ok(id)
    }

    /// Places the start tokens of a fresh instance and runs it.
    pub fn init(&self, store: &mut ExecutionStore, instance: InstanceId, start: NodeId) -> EngineResult<()> {
        self.place_start_tokens(store, instance, start)?;
        self.update(store, instance)
    }

    /// Puts a token on `start` and on every timer start event of its process.
    pub fn place_start_tokens(
        &self,
        store: &mut ExecutionStore,
        instance: InstanceId,
        start: NodeId,
    ) -> EngineResult<()> {
        let mut tx = Transition::new(self, store, instance)?;
        let graph = tx.graph.clone();
        ensure_start_event(&graph, start)?;

        tx.activate(start, BTreeSet::new())?;
        let process = graph.node(start).process;
        for timer_start in graph.timer_start_events(process).filter(|n| *n != start) {
            tx.activate(timer_start, BTreeSet::new())?;
        }
        Ok(())
    }

    /// Updates every running instance, again and again while new instances
    /// show up during a round.
    pub fn update_all(&self, store: &mut ExecutionStore) -> EngineResult<()> {
        let mut round = 0;
        loop {
            round += 1;
            if round > self.config.max_batch_rounds {
                error!(limit = self.config.max_batch_rounds, "Update rounds exhausted");
                return Err(EngineError::RoundLimitExceeded {
                    limit: self.config.max_batch_rounds,
                });
            }

            let snapshot = store.live_instances();
            for id in &snapshot {
                if store.instance(*id)?.is_running() {
                    self.update(store, *id)?;
                }
            }

            let spawned = store.live_instances().difference(&snapshot).count();
            if spawned == 0 {
                return Ok(());
            }
            debug!(spawned, round, "New process instances appeared during update");
        }
    }

    /// Performs all automatic transitions of `instance` until none applies.
    pub fn update(&self, store: &mut ExecutionStore, instance: InstanceId) -> EngineResult<()> {
        let graph = store.instance(instance)?.graph.clone();
        let mut step = 0;
        loop {
            step += 1;
            if step > self.config.max_update_steps {
                error!(instance_id = %instance, limit = self.config.max_update_steps, "Update steps exhausted");
                return Err(EngineError::StepLimitExceeded {
                    instance,
                    limit: self.config.max_update_steps,
                });
            }

            let mut changed = false;
            for token in query::automatic_tokens(store, instance)? {
                let node = store.token(token)?.node;
                if nodes::try_advance(self, store, instance, token)? {
                    info!(instance_id = %instance, token = %token, "Completed {}", graph.node(node));
                    // Restart: the transition may have invalidated other tokens.
                    changed = true;
                    break;
                }
            }
            if !changed {
                return Ok(());
            }
        }
    }

    /// Walks a user chosen `path` from the node of `token` and runs the
    /// instance afterwards. Returns the token placed at the end of the path.
    ///
    /// Only this instance is updated. Instances spawned by message events on
    /// the way keep their start tokens until the next [`Engine::update_all`].
    pub fn execute_path(
        &self,
        store: &mut ExecutionStore,
        token: TokenId,
        path: &[EdgeId],
        input: Value,
    ) -> EngineResult<TokenId> {
        let current = store.token(token)?.clone();
        if !current.active {
            return Err(EngineError::TokenInactive(token));
        }
        let instance = current.instance;
        let graph = store.instance(instance)?.graph.clone();

        let target = validate_path(&graph, current.node, path)?;
        match graph.kind(target) {
            NodeKind::Task { .. }
            | NodeKind::ParallelGateway
            | NodeKind::ExclusiveGateway { .. }
            | NodeKind::EndEvent
            | NodeKind::IntermediateThrowEvent { .. } => {}
            _ => return Err(EngineError::UnsupportedPathTarget(graph.node(target).key.clone())),
        }

        let mut tx = Transition::new(self, store, instance)?;
        let next = tx.move_token(&current, target)?;
        for edge in path.iter().map(|e| graph.edge(*e)) {
            if let EdgeKind::Sequence { operation: Some(operation), .. } = &edge.kind {
                let bindings = vec![
                    ("token".to_string(), json!(token.0)),
                    ("next_token".to_string(), json!(next.0)),
                    ("input".to_string(), input.clone()),
                ];
                tx.evaluate(operation, bindings)?;
            }
        }
        info!(instance_id = %instance, from = %graph.node(current.node), to = %graph.node(target), "Path executed");

        self.update(store, instance)?;
        Ok(next)
    }

    /// Evaluates a rule in the scope of `instance`, outside any transition.
    pub fn calculate(
        &self,
        store: &mut ExecutionStore,
        instance: InstanceId,
        expression: &Expression,
    ) -> EngineResult<Value> {
        let subject = store.instance_mut(instance)?;
        self.rules
            .evaluate(expression, &mut RuleScope::of(subject))
            .map_err(|e| EngineError::Rule {
                expression: expression.to_string(),
                message: format!("{:#}", e),
            })
    }
}

fn ensure_start_event(graph: &ProcessGraph, node: NodeId) -> EngineResult<()> {
    match graph.kind(node) {
        NodeKind::StartEvent { .. } => Ok(()),
        _ => Err(EngineError::NotAStartEvent(graph.node(node).key.clone())),
    }
}

/// Checks that `path` is a chain of sequence flows leaving `from`; returns
/// its final target.
fn validate_path(graph: &ProcessGraph, from: NodeId, path: &[EdgeId]) -> EngineResult<NodeId> {
    if path.is_empty() {
        return Err(EngineError::InvalidPath("empty path".to_string()));
    }
    let mut at = from;
    for id in path {
        let edge = graph
            .edges
            .get(id.0)
            .ok_or_else(|| EngineError::InvalidPath(format!("unknown edge {}", id)))?;
        if !matches!(edge.kind, EdgeKind::Sequence { .. }) {
            return Err(EngineError::InvalidPath(format!("'{}' is not a sequence flow", edge.key)));
        }
        if edge.source != at {
            return Err(EngineError::InvalidPath(format!(
                "'{}' does not start at '{}'",
                edge.key,
                graph.node(at).key
            )));
        }
        at = edge.target;
    }
    Ok(at)
}
