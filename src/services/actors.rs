use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Result, bail};
use serde_json::Value;

use crate::runtime::context::Actor;
use crate::runtime::graph::Expression;
use crate::services::{ActorResolver, RuleEvaluator, RuleScope};

/// Evaluates actor rules with the rule evaluator. The rule must produce an
/// actor name or a list of actor names.
#[derive(Debug)]
pub struct RuleActorResolver {
    rules: Arc<dyn RuleEvaluator>,
}

impl RuleActorResolver {
    pub fn new(rules: Arc<dyn RuleEvaluator>) -> Self {
        Self { rules }
    }
}

impl ActorResolver for RuleActorResolver {
    fn resolve(&self, rule: &Expression, scope: &mut RuleScope<'_>) -> Result<BTreeSet<Actor>> {
        match self.rules.evaluate(rule, scope)? {
            Value::String(name) => Ok(BTreeSet::from([Actor(name)])),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(name) => Ok(Actor(name)),
                    other => bail!("actor rule '{}' produced a non-string entry: {}", rule, other),
                })
                .collect(),
            Value::Null => Ok(BTreeSet::new()),
            other => bail!("actor rule '{}' produced {}, expected actor names", rule, other),
        }
    }
}
