use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use dashmap::DashMap;
use evalexpr::{
    Context as _, ContextWithMutableVariables, DefaultNumericTypes, HashMapContext, Node as EvalNode,
    build_operator_tree,
};
use serde_json::{Map, Value, json};

use crate::runtime::graph::Expression;
use crate::services::{RELATED_PREFIX, RuleEvaluator, RuleScope};

type EvalValue = evalexpr::Value<DefaultNumericTypes>;

const INSTANCE_ID: &str = "instance_id";

/// [`RuleEvaluator`] backed by `evalexpr`.
///
/// Subject variables are visible by name, related variables as
/// `target.<name>`. Assignments (`x = x + 1`) are written back to the
/// instance they address. Variables an expression only reads are left as
/// they were, so values `evalexpr` cannot hold exactly survive a rule.
#[derive(Debug, Default)]
pub struct EvalexprEvaluator {
    // Compiled operator trees keyed by expression source.
    cache: DashMap<String, Arc<EvalNode<DefaultNumericTypes>>>,
}

impl EvalexprEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, expression: &Expression) -> Result<Arc<EvalNode<DefaultNumericTypes>>> {
        if let Some(node) = self.cache.get(expression.source()) {
            return Ok(node.clone());
        }
        let node = build_operator_tree::<DefaultNumericTypes>(expression.source())
            .map_err(|e| anyhow!("cannot parse '{}': {}", expression, e))?;
        let node = Arc::new(node);
        self.cache.insert(expression.source().to_string(), node.clone());
        Ok(node)
    }
}

impl RuleEvaluator for EvalexprEvaluator {
    fn evaluate(&self, expression: &Expression, scope: &mut RuleScope<'_>) -> Result<Value> {
        let tree = self.compile(expression)?;

        let mut read_only: HashSet<String> = HashSet::new();
        let mut bound: HashMap<String, EvalValue> = HashMap::new();
        let mut eval_ctx = HashMapContext::<DefaultNumericTypes>::new();

        if let Some(subject) = scope.subject.as_deref() {
            bind_all(&mut eval_ctx, &mut bound, "", &subject.variables)?;
            eval_ctx
                .set_value(INSTANCE_ID.to_string(), EvalValue::String(subject.id.to_string()))
                .map_err(|e| anyhow!("{}", e))?;
            read_only.insert(INSTANCE_ID.to_string());
        }
        if let Some(related) = scope.related.as_deref() {
            bind_all(&mut eval_ctx, &mut bound, RELATED_PREFIX, &related.variables)?;
            let key = format!("{}{}", RELATED_PREFIX, INSTANCE_ID);
            eval_ctx
                .set_value(key.clone(), EvalValue::String(related.id.to_string()))
                .map_err(|e| anyhow!("{}", e))?;
            read_only.insert(key);
        }
        for (name, value) in &scope.bindings {
            if let Some(ev) = to_eval(value) {
                eval_ctx.set_value(name.clone(), ev).map_err(|e| anyhow!("{}", e))?;
            }
            read_only.insert(name.clone());
        }

        let result = tree
            .eval_with_context_mut(&mut eval_ctx)
            .map_err(|e| anyhow!("{}", e))?;

        // Only variables the expression changed go back to the instance.
        for ident in tree.iter_variable_identifiers() {
            if read_only.contains(ident) {
                continue;
            }
            let Some(current) = eval_ctx.get_value(ident) else {
                continue;
            };
            if bound.get(ident) == Some(current) {
                continue;
            }
            let Some(value) = from_eval(current) else {
                continue;
            };
            if let Some(name) = ident.strip_prefix(RELATED_PREFIX) {
                if let Some(related) = scope.related.as_deref_mut() {
                    related.variables.insert(name.to_string(), value);
                }
            } else if let Some(subject) = scope.subject.as_deref_mut() {
                subject.variables.insert(ident.to_string(), value);
            }
        }

        Ok(from_eval(&result).unwrap_or(Value::Null))
    }
}

fn bind_all(
    ctx: &mut HashMapContext<DefaultNumericTypes>,
    bound: &mut HashMap<String, EvalValue>,
    prefix: &str,
    vars: &Map<String, Value>,
) -> Result<()> {
    for (k, v) in vars {
        if let Some(ev) = to_eval(v) {
            let name = format!("{}{}", prefix, k);
            ctx.set_value(name.clone(), ev.clone()).map_err(|e| anyhow!("{}", e))?;
            bound.insert(name, ev);
        }
    }
    Ok(())
}

fn to_eval(value: &Value) -> Option<EvalValue> {
    match value {
        Value::String(s) => Some(EvalValue::String(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(EvalValue::Int(i))
            } else {
                n.as_f64().map(EvalValue::Float)
            }
        }
        Value::Bool(b) => Some(EvalValue::Boolean(*b)),
        Value::Array(items) => Some(EvalValue::Tuple(items.iter().filter_map(to_eval).collect())),
        Value::Null => Some(EvalValue::Empty),
        Value::Object(_) => None,
    }
}

fn from_eval(value: &EvalValue) -> Option<Value> {
    match value {
        EvalValue::String(s) => Some(Value::String(s.clone())),
        EvalValue::Int(i) => Some(json!(i)),
        EvalValue::Float(f) => Some(json!(f)),
        EvalValue::Boolean(b) => Some(Value::Bool(*b)),
        EvalValue::Tuple(items) => Some(Value::Array(items.iter().filter_map(from_eval).collect())),
        EvalValue::Empty => Some(Value::Null),
    }
}
