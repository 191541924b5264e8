pub mod builder;

use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use serde_json::Value;

/// A collaboration as written in a definition file: a set of processes plus
/// the message flows between them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collaboration {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub processes: Vec<Process>,
    #[serde(default)]
    pub message_flows: Vec<MessageFlow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Process {
    pub id: String,
    pub name: String,
    /// Initial variables of every instance of this process.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    #[serde(default)]
    pub lanes: Vec<Lane>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A lane groups nodes that the same set of actors may work on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lane {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub actor_rule: Option<String>,
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum EventDefinition {
    Timer { delay_ms: u64 },
    Message {
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeType {
    StartEvent {
        #[serde(default)]
        definition: Option<EventDefinition>,
    },
    EndEvent,
    ManualTask,
    SendTask {
        /// Rule producing the recipient addresses.
        #[serde(default)]
        receivers: Option<String>,
        #[serde(default)]
        subject: String,
        #[serde(default)]
        body: String,
    },
    ServiceTask {
        #[serde(default)]
        action: Option<String>,
    },
    ExclusiveGateway {
        /// Id of the outgoing edge taken when no rule matches.
        #[serde(default)]
        default_flow: Option<String>,
        /// Automatic gateways are decided by the engine, the others by a user.
        #[serde(default)]
        automatic: bool,
    },
    ParallelGateway,
    BoundaryEvent {
        attached_to: String,
        #[serde(default)]
        definition: Option<EventDefinition>,
        #[serde(default = "default_true")]
        cancel_activity: bool,
    },
    IntermediateThrowEvent {
        #[serde(default)]
        definition: Option<EventDefinition>,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: NodeType,
}

/// A sequence flow inside one process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    /// Defaults to `source->target` when omitted.
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub condition: Option<String>,
    /// Evaluated when a user walks this edge.
    #[serde(default)]
    pub operation: Option<String>,
}

impl Edge {
    pub fn effective_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}->{}", self.source, self.target))
    }
}

/// A message flow, possibly crossing process boundaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageFlow {
    #[serde(default)]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
    /// Links the sending instance with the one created at the target.
    #[serde(default)]
    pub connect: Option<String>,
}

impl MessageFlow {
    pub fn effective_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}~>{}", self.source, self.target))
    }
}
