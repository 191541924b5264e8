//! Transition handlers, one per node kind.
//!
//! Every handler answers one question for one active token: can it make
//! progress right now? If so, it performs the transition through
//! [`Transition`] and returns `true`.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::trace;

use crate::error::{EngineError, EngineResult};
use crate::runtime::context::Actor;
use crate::runtime::engine::Engine;
use crate::runtime::graph::{Expression, NodeId, NodeKind, ProcessGraph, TaskKind, TimerDef};
use crate::runtime::instance::InstanceId;
use crate::runtime::storage::ExecutionStore;
use crate::runtime::token::{Token, TokenId};
use crate::services::RuleScope;

pub mod event;
pub mod gateway;
pub mod task;

type Handler = fn(&mut Transition<'_>, &Token) -> EngineResult<bool>;

fn handler_for(kind: &NodeKind) -> Handler {
    match kind {
        NodeKind::ParallelGateway => gateway::advance_parallel,
        NodeKind::ExclusiveGateway { .. } => gateway::advance_exclusive,
        NodeKind::StartEvent { .. } => event::advance_start,
        NodeKind::EndEvent => event::advance_end,
        NodeKind::BoundaryEvent { .. } => event::advance_boundary,
        NodeKind::IntermediateThrowEvent { .. } => event::advance_throw,
        NodeKind::Task { kind: TaskKind::Send(_), .. } => task::advance_send,
        NodeKind::Task { kind: TaskKind::Service { .. }, .. } => task::advance_service,
        NodeKind::Task { kind: TaskKind::Manual, .. } => idle,
    }
}

/// Nodes that only move on a user's command.
fn idle(tx: &mut Transition<'_>, token: &Token) -> EngineResult<bool> {
    trace!(
        instance_id = %tx.instance,
        token = %token.id,
        node = %tx.graph.node(token.node),
        "No automatic transition"
    );
    Ok(false)
}

/// Tries to move `token` one step further.
pub(crate) fn try_advance(
    engine: &Engine,
    store: &mut ExecutionStore,
    instance: InstanceId,
    token: TokenId,
) -> EngineResult<bool> {
    let token = store.token(token)?.clone();
    if !token.active {
        return Ok(false);
    }
    let mut tx = Transition::new(engine, store, instance)?;
    let handler = handler_for(tx.graph.kind(token.node));
    handler(&mut tx, &token)
}

/// The operations a handler may perform on one instance.
pub(crate) struct Transition<'a> {
    pub engine: &'a Engine,
    pub store: &'a mut ExecutionStore,
    pub graph: Arc<ProcessGraph>,
    pub instance: InstanceId,
    pub now: DateTime<Utc>,
    pub actor: Option<Actor>,
}

impl<'a> Transition<'a> {
    pub fn new(engine: &'a Engine, store: &'a mut ExecutionStore, instance: InstanceId) -> EngineResult<Self> {
        let graph = store.instance(instance)?.graph.clone();
        let session = engine.session();
        Ok(Self {
            engine,
            store,
            graph,
            instance,
            now: session.now(),
            actor: session.current_actor(),
        })
    }

    /// Creates and activates a token on `node`.
    pub fn activate(&mut self, node: NodeId, previous: BTreeSet<TokenId>) -> EngineResult<TokenId> {
        let token = self.store.create_token(self.instance, node, previous, self.now)?;
        self.store
            .swap(self.instance, &[], Some(token), self.now, self.actor.as_ref())?;
        Ok(token)
    }

    /// Deactivates `tokens`, recording when and by whom.
    pub fn finish(&mut self, tokens: &[TokenId]) -> EngineResult<()> {
        self.store
            .swap(self.instance, tokens, None, self.now, self.actor.as_ref())
    }

    /// One new token per outgoing edge of the token's node, then the token
    /// itself is finished.
    pub fn fan_out(&mut self, token: &Token) -> EngineResult<Vec<TokenId>> {
        let graph = self.graph.clone();
        let mut created = Vec::new();
        for edge in graph.outgoing(token.node) {
            let next = self.activate(edge.target, BTreeSet::from([token.id]))?;
            self.activate_boundary_events(next, edge.target)?;
            created.push(next);
        }
        self.finish(&[token.id])?;
        Ok(created)
    }

    /// Replaces `token` by a new token on `target`.
    pub fn move_token(&mut self, token: &Token, target: NodeId) -> EngineResult<TokenId> {
        let next = self
            .store
            .create_token(self.instance, target, BTreeSet::from([token.id]), self.now)?;
        self.store
            .swap(self.instance, &[token.id], Some(next), self.now, self.actor.as_ref())?;
        self.activate_boundary_events(next, target)?;
        Ok(next)
    }

    /// Starts the boundary events of a task that just received `task_token`.
    pub fn activate_boundary_events(&mut self, task_token: TokenId, node: NodeId) -> EngineResult<()> {
        let graph = self.graph.clone();
        for event in graph.boundary_events(node) {
            self.activate(*event, BTreeSet::from([task_token]))?;
        }
        Ok(())
    }

    pub fn tokens_at(&self, node: NodeId) -> EngineResult<Vec<TokenId>> {
        Ok(self.store.tokens_at(self.instance, node)?.into_iter().collect())
    }

    pub fn timer_expired(&self, token: &Token, timer: &TimerDef) -> bool {
        self.now - token.created_at >= timer.delay()
    }

    /// Evaluates `expression` with the instance as subject.
    pub fn evaluate(&mut self, expression: &Expression, bindings: Vec<(String, Value)>) -> EngineResult<Value> {
        let rules = self.engine.rules().clone();
        let subject = self.store.instance_mut(self.instance)?;
        let mut scope = RuleScope::of(subject);
        scope.bindings = bindings;
        rules
            .evaluate(expression, &mut scope)
            .map_err(|e| EngineError::Rule {
                expression: expression.to_string(),
                message: format!("{:#}", e),
            })
    }

    /// Anything but a boolean `true` counts as `false`.
    pub fn evaluate_bool(&mut self, expression: &Expression) -> EngineResult<bool> {
        Ok(matches!(self.evaluate(expression, Vec::new())?, Value::Bool(true)))
    }
}
