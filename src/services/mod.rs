use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::runtime::context::Actor;
use crate::runtime::graph::{Expression, NodeId, ProcessGraph};
use crate::runtime::instance::ProcessInstance;

pub mod actors;
pub mod factory;
pub mod notify;
pub mod rules;

/// Prefix under which the related instance's variables are visible to rules.
pub const RELATED_PREFIX: &str = "target.";

/// Everything a rule may look at or write to.
pub struct RuleScope<'a> {
    /// Instance whose variables are visible unprefixed and writable.
    pub subject: Option<&'a mut ProcessInstance>,
    /// Second instance, visible and writable under [`RELATED_PREFIX`].
    pub related: Option<&'a mut ProcessInstance>,
    /// Read-only values.
    pub bindings: Vec<(String, Value)>,
}

impl<'a> RuleScope<'a> {
    pub fn empty() -> Self {
        Self {
            subject: None,
            related: None,
            bindings: Vec::new(),
        }
    }

    pub fn of(subject: &'a mut ProcessInstance) -> Self {
        Self {
            subject: Some(subject),
            related: None,
            bindings: Vec::new(),
        }
    }

    /// Exposes the variables of `instance` without allowing writes.
    pub fn read_only(instance: &ProcessInstance) -> Self {
        let mut bindings: Vec<(String, Value)> = instance
            .variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        bindings.push(("instance_id".to_string(), Value::String(instance.id.to_string())));
        Self {
            subject: None,
            related: None,
            bindings,
        }
    }

    pub fn with_related(mut self, related: &'a mut ProcessInstance) -> Self {
        self.related = Some(related);
        self
    }

    pub fn bind(mut self, name: &str, value: Value) -> Self {
        self.bindings.push((name.to_string(), value));
        self
    }
}

/// Evaluates gateway rules, task actions, receiver rules, connect
/// expressions and actor rules.
pub trait RuleEvaluator: Send + Sync + Debug {
    fn evaluate(&self, expression: &Expression, scope: &mut RuleScope<'_>) -> Result<Value>;
}

/// Delivers the notification of a send task.
pub trait NotificationSender: Send + Sync + Debug {
    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<()>;
}

/// Allocates the instance object for a process started at `start`.
pub trait InstanceFactory: Send + Sync + Debug {
    fn create(&self, graph: &Arc<ProcessGraph>, start: NodeId, now: DateTime<Utc>) -> Result<ProcessInstance>;
}

/// Resolves an actor rule (usually a lane's) into the permitted actors.
pub trait ActorResolver: Send + Sync + Debug {
    fn resolve(&self, rule: &Expression, scope: &mut RuleScope<'_>) -> Result<BTreeSet<Actor>>;
}
