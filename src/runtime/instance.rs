use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::runtime::graph::{ProcessGraph, ProcessId};
use crate::runtime::token::TokenId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionState {
    Running,
    Finished,
}

/// One running execution of a process of a collaboration.
#[derive(Debug, Clone)]
pub struct ProcessInstance {
    pub id: InstanceId,
    pub graph: Arc<ProcessGraph>,
    pub process: ProcessId,
    pub state: ExecutionState,
    pub(crate) active_tokens: BTreeSet<TokenId>,
    pub(crate) all_tokens: Vec<TokenId>,
    /// Domain data read and written by rules.
    pub variables: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProcessInstance {
    pub fn new(graph: Arc<ProcessGraph>, process: ProcessId, created_at: DateTime<Utc>) -> Self {
        Self {
            id: InstanceId::generate(),
            graph,
            process,
            state: ExecutionState::Running,
            active_tokens: BTreeSet::new(),
            all_tokens: Vec::new(),
            variables: Map::new(),
            created_at,
            finished_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ExecutionState::Running
    }

    pub fn active_tokens(&self) -> &BTreeSet<TokenId> {
        &self.active_tokens
    }

    /// Every token ever created for this instance, in creation order.
    pub fn all_tokens(&self) -> &[TokenId] {
        &self.all_tokens
    }

    /// Name of the process this instance executes.
    pub fn process_name(&self) -> &str {
        &self.graph.process(self.process).name
    }

    pub fn var(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    pub fn set_var(&mut self, key: &str, value: Value) {
        self.variables.insert(key.to_string(), value);
    }
}
