use tracing::debug;

use crate::error::EngineResult;
use crate::nodes::Transition;
use crate::runtime::graph::{EdgeKind, NodeId};
use crate::runtime::token::{Token, TokenId};

/// Fires once every incoming edge has delivered a token.
pub(crate) fn advance_parallel(tx: &mut Transition<'_>, token: &Token) -> EngineResult<bool> {
    let merged = tx.tokens_at(token.node)?;
    let required = tx.graph.node(token.node).incoming.len();
    if merged.len() != required {
        return Ok(false);
    }

    let graph = tx.graph.clone();
    let mut remove: &[TokenId] = &merged;
    for edge in graph.outgoing(token.node) {
        let next = tx
            .store
            .create_token(tx.instance, edge.target, merged.iter().copied().collect(), tx.now)?;
        tx.store
            .swap(tx.instance, remove, Some(next), tx.now, tx.actor.as_ref())?;
        tx.activate_boundary_events(next, edge.target)?;
        remove = &[];
    }
    if !remove.is_empty() {
        // A join without outgoing edges just consumes its tokens.
        tx.finish(remove)?;
    }
    Ok(true)
}

/// Follows the first outgoing edge whose rule holds, else the default flow.
pub(crate) fn advance_exclusive(tx: &mut Transition<'_>, token: &Token) -> EngineResult<bool> {
    match select_target(tx, token.node)? {
        Some(target) => {
            tx.move_token(token, target)?;
            Ok(true)
        }
        None => {
            debug!(
                instance_id = %tx.instance,
                node = %tx.graph.node(token.node),
                "No rule matched and no default flow, gateway stalls"
            );
            Ok(false)
        }
    }
}

fn select_target(tx: &mut Transition<'_>, gateway: NodeId) -> EngineResult<Option<NodeId>> {
    let graph = tx.graph.clone();
    let default_flow = graph.default_flow(gateway);
    for edge in graph.outgoing(gateway) {
        if Some(edge.id) == default_flow {
            continue;
        }
        let EdgeKind::Sequence { rule, .. } = &edge.kind else {
            continue;
        };
        let taken = match rule {
            Some(rule) => tx.evaluate_bool(rule)?,
            None => true,
        };
        if taken {
            return Ok(Some(edge.target));
        }
    }
    Ok(default_flow.map(|flow| graph.edge(flow).target))
}
