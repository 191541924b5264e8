//! Read-only questions a host asks about graphs and instances.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::runtime::context::Actor;
use crate::runtime::graph::{NodeId, NodeKind, ProcessGraph, TaskKind};
use crate::runtime::instance::{InstanceId, ProcessInstance};
use crate::runtime::storage::ExecutionStore;
use crate::runtime::token::TokenId;
use crate::services::{ActorResolver, RuleScope};

/// Whether `node` waits for a user decision instead of advancing by itself.
pub fn is_manual(graph: &ProcessGraph, node: NodeId) -> bool {
    match graph.kind(node) {
        NodeKind::ExclusiveGateway { automatic, .. } => !automatic,
        NodeKind::Task { kind: TaskKind::Manual, .. } => true,
        _ => false,
    }
}

/// Active tokens of `instance` on `node`.
pub fn tokens_at(store: &ExecutionStore, instance: InstanceId, node: NodeId) -> EngineResult<BTreeSet<TokenId>> {
    store.tokens_at(instance, node)
}

/// Active tokens sitting on manual decision points.
pub fn user_relevant_tokens(store: &ExecutionStore, instance: InstanceId) -> EngineResult<Vec<TokenId>> {
    partition(store, instance, true)
}

/// Active tokens the engine may try to advance on its own.
pub fn automatic_tokens(store: &ExecutionStore, instance: InstanceId) -> EngineResult<Vec<TokenId>> {
    partition(store, instance, false)
}

fn partition(store: &ExecutionStore, instance: InstanceId, manual: bool) -> EngineResult<Vec<TokenId>> {
    let instance = store.instance(instance)?;
    let mut tokens = Vec::new();
    for id in instance.active_tokens() {
        let token = store.token(*id)?;
        if is_manual(&instance.graph, token.node) == manual {
            tokens.push(*id);
        }
    }
    Ok(tokens)
}

/// Start events without a trigger, across every process of the graph.
pub fn manual_start_events(graph: &ProcessGraph) -> EngineResult<Vec<NodeId>> {
    let starts: Vec<NodeId> = graph
        .nodes()
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::StartEvent { definition: None }))
        .map(|n| n.id)
        .collect();
    if starts.is_empty() {
        return Err(EngineError::NoStartEvent(graph.id.clone()));
    }
    Ok(starts)
}

/// Who may act on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    Anyone,
    Only(BTreeSet<Actor>),
}

impl Permission {
    pub fn allows(&self, actor: &Actor) -> bool {
        match self {
            Permission::Anyone => true,
            Permission::Only(actors) => actors.contains(actor),
        }
    }
}

/// Permission checks backed by lane actor rules.
#[derive(Debug, Clone)]
pub struct ProcessQueries {
    actors: Arc<dyn ActorResolver>,
}

impl ProcessQueries {
    pub fn new(actors: Arc<dyn ActorResolver>) -> Self {
        Self { actors }
    }

    /// Resolves the actor rule of the lane holding `node`. Nodes outside a
    /// lane, or in a lane without a rule, are open to anyone.
    pub fn permission(
        &self,
        graph: &ProcessGraph,
        node: NodeId,
        instance: Option<&ProcessInstance>,
    ) -> EngineResult<Permission> {
        let Some(lane) = graph.node(node).lane else {
            return Ok(Permission::Anyone);
        };
        let Some(rule) = &graph.lane(lane).actor_rule else {
            return Ok(Permission::Anyone);
        };
        let mut scope = match instance {
            Some(instance) => RuleScope::read_only(instance),
            None => RuleScope::empty(),
        };
        let actors = self.actors.resolve(rule, &mut scope)?;
        Ok(Permission::Only(actors))
    }

    pub fn start_permission(&self, graph: &ProcessGraph, start: NodeId) -> EngineResult<Permission> {
        if !matches!(graph.kind(start), NodeKind::StartEvent { .. }) {
            return Err(EngineError::NotAStartEvent(graph.node(start).key.clone()));
        }
        self.permission(graph, start, None)
    }

    /// Manual start events `actor` is allowed to trigger.
    pub fn startable_events(&self, graph: &ProcessGraph, actor: &Actor) -> EngineResult<Vec<NodeId>> {
        let mut allowed = Vec::new();
        for start in manual_start_events(graph)? {
            if self.start_permission(graph, start)?.allows(actor) {
                allowed.push(start);
            }
        }
        Ok(allowed)
    }

    /// Whether `actor` may execute a path from `token`.
    pub fn can_work_on(&self, store: &ExecutionStore, token: TokenId, actor: &Actor) -> EngineResult<bool> {
        let token = store.token(token)?;
        if !token.active {
            return Ok(false);
        }
        let instance = store.instance(token.instance)?;
        Ok(self
            .permission(&instance.graph, token.node, Some(instance))?
            .allows(actor))
    }
}
