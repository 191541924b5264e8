use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::nodes::Transition;
use crate::runtime::graph::{EdgeKind, EventDef, GraphEdge, NodeKind};
use crate::runtime::instance::ExecutionState;
use crate::runtime::token::Token;
use crate::services::RuleScope;

pub(crate) fn advance_start(tx: &mut Transition<'_>, token: &Token) -> EngineResult<bool> {
    let NodeKind::StartEvent { definition } = tx.graph.kind(token.node) else {
        return Ok(false);
    };
    if let Some(EventDef::Timer(timer)) = definition {
        if !tx.timer_expired(token, timer) {
            return Ok(false);
        }
    }
    tx.fan_out(token)?;
    Ok(true)
}

/// Reaching any end event terminates the whole instance.
pub(crate) fn advance_end(tx: &mut Transition<'_>, _token: &Token) -> EngineResult<bool> {
    let active: Vec<_> = tx.store.instance(tx.instance)?.active_tokens().iter().copied().collect();
    tx.finish(&active)?;

    let now = tx.now;
    let instance = tx.store.instance_mut(tx.instance)?;
    instance.state = ExecutionState::Finished;
    instance.finished_at = Some(now);
    info!(instance_id = %tx.instance, "Process instance finished");
    Ok(true)
}

pub(crate) fn advance_boundary(tx: &mut Transition<'_>, token: &Token) -> EngineResult<bool> {
    let NodeKind::BoundaryEvent { attached_to, definition, cancel_activity } = tx.graph.kind(token.node).clone()
    else {
        return Ok(false);
    };

    let task_tokens = tx.tokens_at(attached_to)?;
    if task_tokens.is_empty() {
        // The task moved on, nothing left to watch.
        tx.finish(&[token.id])?;
        return Ok(true);
    }

    let Some(EventDef::Timer(timer)) = definition else {
        return Ok(false);
    };
    if !tx.timer_expired(token, &timer) {
        return Ok(false);
    }
    tx.fan_out(token)?;
    if cancel_activity {
        tx.finish(&task_tokens)?;
    }
    Ok(true)
}

/// Message throw events start a new instance at the receiving start event
/// and pass their own token on in any case.
pub(crate) fn advance_throw(tx: &mut Transition<'_>, token: &Token) -> EngineResult<bool> {
    let graph = tx.graph.clone();
    if let NodeKind::IntermediateThrowEvent { definition: Some(EventDef::Message(_)) } = graph.kind(token.node) {
        let flow = graph
            .message_flow_from(token.node)
            .ok_or_else(|| EngineError::MissingMessageFlow(graph.node(token.node).key.clone()))?;
        if matches!(graph.kind(flow.target), NodeKind::StartEvent { .. }) {
            spawn_instance(tx, flow)?;
        }
    }
    tx.fan_out(token)?;
    Ok(true)
}

fn spawn_instance(tx: &mut Transition<'_>, flow: &GraphEdge) -> EngineResult<()> {
    let mut spawned = tx.engine.factory().create(&tx.graph, flow.target, tx.now)?;

    if let EdgeKind::Message { connect: Some(connect) } = &flow.kind {
        let rules = tx.engine.rules().clone();
        let origin = tx.store.instance_mut(tx.instance)?;
        let mut scope = RuleScope::of(origin).with_related(&mut spawned);
        rules
            .evaluate(connect, &mut scope)
            .map_err(|e| EngineError::Rule {
                expression: connect.to_string(),
                message: format!("{:#}", e),
            })?;
    }

    let id = tx.store.insert_instance(spawned);
    tx.engine.place_start_tokens(tx.store, id, flow.target)?;
    info!(
        instance_id = %tx.instance,
        spawned = %id,
        start = %tx.graph.node(flow.target),
        "Message started a new process instance"
    );
    Ok(())
}
