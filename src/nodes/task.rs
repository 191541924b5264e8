use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::nodes::Transition;
use crate::runtime::graph::{NodeKind, SendSpec, TaskKind};
use crate::runtime::token::Token;
use crate::services::notify::render_template;

/// Sends the notification, then moves on whether or not delivery worked.
pub(crate) fn advance_send(tx: &mut Transition<'_>, token: &Token) -> EngineResult<bool> {
    let NodeKind::Task { kind: TaskKind::Send(send), .. } = tx.graph.kind(token.node).clone() else {
        return Ok(false);
    };

    let recipients = resolve_recipients(tx, &send)?;
    if recipients.is_empty() {
        debug!(instance_id = %tx.instance, node = %tx.graph.node(token.node), "No recipients, nothing sent");
    } else {
        let instance = tx.store.instance(tx.instance)?;
        let lookup = |name: &str| instance.var(name).map(display_value);
        let subject = render_template(&send.subject, lookup);
        let body = render_template(&send.body, lookup);
        if let Err(e) = tx.engine.notifier().send(&recipients, &subject, &body) {
            warn!(
                instance_id = %tx.instance,
                node = %tx.graph.node(token.node),
                error = ?e,
                "Sending notification failed"
            );
        }
    }

    tx.fan_out(token)?;
    Ok(true)
}

/// Runs the configured action for its side effects, then moves on.
pub(crate) fn advance_service(tx: &mut Transition<'_>, token: &Token) -> EngineResult<bool> {
    if let NodeKind::Task { kind: TaskKind::Service { action: Some(action) }, .. } = tx.graph.kind(token.node).clone() {
        tx.evaluate(&action, Vec::new())?;
    }
    tx.fan_out(token)?;
    Ok(true)
}

fn resolve_recipients(tx: &mut Transition<'_>, send: &SendSpec) -> EngineResult<Vec<String>> {
    let Some(rule) = &send.receivers else {
        return Ok(Vec::new());
    };
    let invalid = |found: &Value| EngineError::Rule {
        expression: rule.to_string(),
        message: format!("expected recipient addresses, found {}", found),
    };
    match tx.evaluate(rule, Vec::new())? {
        Value::Null => Ok(Vec::new()),
        Value::String(address) => Ok(vec![address]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(|| invalid(item)))
            .collect(),
        other => Err(invalid(&other)),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
