use std::collections::HashMap;
use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, EngineResult};

macro_rules! index_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

index_type!(NodeId);
index_type!(EdgeId);
index_type!(ProcessId);
index_type!(LaneId);

/// A rule or action in the host's expression language.
///
/// `${...}` wrappers are stripped, so `${x > 3}` and `x > 3` are the same rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression(String);

impl Expression {
    pub fn new(source: &str) -> Self {
        let source = source.trim();
        let inner = source
            .strip_prefix("${")
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(source);
        Self(inner.trim().to_string())
    }

    pub fn source(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerDef {
    pub delay_ms: u64,
}

impl TimerDef {
    pub fn delay(&self) -> TimeDelta {
        TimeDelta::milliseconds(i64::try_from(self.delay_ms).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDef {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDef {
    Timer(TimerDef),
    Message(MessageDef),
}

impl EventDef {
    pub fn timer(&self) -> Option<&TimerDef> {
        match self {
            EventDef::Timer(timer) => Some(timer),
            EventDef::Message(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendSpec {
    pub receivers: Option<Expression>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Manual,
    Send(SendSpec),
    Service { action: Option<Expression> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    StartEvent {
        definition: Option<EventDef>,
    },
    EndEvent,
    Task {
        kind: TaskKind,
        boundary_events: Vec<NodeId>,
    },
    ExclusiveGateway {
        default_flow: Option<EdgeId>,
        automatic: bool,
    },
    ParallelGateway,
    BoundaryEvent {
        attached_to: NodeId,
        definition: Option<EventDef>,
        cancel_activity: bool,
    },
    IntermediateThrowEvent {
        definition: Option<EventDef>,
    },
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::StartEvent { .. } => "start event",
            NodeKind::EndEvent => "end event",
            NodeKind::Task { kind: TaskKind::Manual, .. } => "manual task",
            NodeKind::Task { kind: TaskKind::Send(_), .. } => "send task",
            NodeKind::Task { kind: TaskKind::Service { .. }, .. } => "service task",
            NodeKind::ExclusiveGateway { .. } => "exclusive gateway",
            NodeKind::ParallelGateway => "parallel gateway",
            NodeKind::BoundaryEvent { .. } => "boundary event",
            NodeKind::IntermediateThrowEvent { .. } => "intermediate throw event",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: NodeId,
    /// Id from the definition file.
    pub key: String,
    pub name: String,
    pub process: ProcessId,
    pub lane: Option<LaneId>,
    pub kind: NodeKind,
    pub outgoing: Vec<EdgeId>,
    pub incoming: Vec<EdgeId>,
}

impl fmt::Display for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind.label(), self.key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    Sequence {
        rule: Option<Expression>,
        operation: Option<Expression>,
    },
    Message {
        connect: Option<Expression>,
    },
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub key: String,
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone)]
pub struct ProcessDef {
    pub id: ProcessId,
    pub key: String,
    pub name: String,
    pub variables: Map<String, Value>,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct LaneDef {
    pub id: LaneId,
    pub key: String,
    pub name: String,
    pub process: ProcessId,
    pub actor_rule: Option<Expression>,
}

/// Compiled, immutable collaboration graph shared by all its instances.
#[derive(Debug, Clone)]
pub struct ProcessGraph {
    pub id: String,
    pub name: String,
    pub(crate) processes: Vec<ProcessDef>,
    pub(crate) lanes: Vec<LaneDef>,
    pub(crate) nodes: Vec<GraphNode>,
    pub(crate) edges: Vec<GraphEdge>,
    pub(crate) message_flows: Vec<EdgeId>,
    pub(crate) node_index: HashMap<String, NodeId>,
}

impl ProcessGraph {
    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &GraphEdge {
        &self.edges[id.0]
    }

    pub fn process(&self, id: ProcessId) -> &ProcessDef {
        &self.processes[id.0]
    }

    pub fn lane(&self, id: LaneId) -> &LaneDef {
        &self.lanes[id.0]
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn processes(&self) -> &[ProcessDef] {
        &self.processes
    }

    pub fn node_by_key(&self, key: &str) -> Option<NodeId> {
        self.node_index.get(key).copied()
    }

    pub fn process_by_key(&self, key: &str) -> Option<ProcessId> {
        self.processes.iter().find(|p| p.key == key).map(|p| p.id)
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.node(node).kind
    }

    /// Outgoing sequence flows in definition order.
    pub fn outgoing(&self, node: NodeId) -> impl Iterator<Item = &GraphEdge> {
        self.node(node).outgoing.iter().map(move |e| self.edge(*e))
    }

    pub fn incoming(&self, node: NodeId) -> impl Iterator<Item = &GraphEdge> {
        self.node(node).incoming.iter().map(move |e| self.edge(*e))
    }

    pub fn default_flow(&self, node: NodeId) -> Option<EdgeId> {
        match self.kind(node) {
            NodeKind::ExclusiveGateway { default_flow, .. } => *default_flow,
            _ => None,
        }
    }

    /// Boundary events attached to `node`; empty unless it is a task.
    pub fn boundary_events(&self, node: NodeId) -> &[NodeId] {
        match self.kind(node) {
            NodeKind::Task { boundary_events, .. } => boundary_events,
            _ => &[],
        }
    }

    pub fn message_flows(&self) -> impl Iterator<Item = &GraphEdge> {
        self.message_flows.iter().map(move |e| self.edge(*e))
    }

    /// The first message flow whose source is `node`.
    pub fn message_flow_from(&self, node: NodeId) -> Option<&GraphEdge> {
        self.message_flows().find(|flow| flow.source == node)
    }

    pub fn start_events(&self, process: ProcessId) -> impl Iterator<Item = NodeId> + '_ {
        self.process(process)
            .nodes
            .iter()
            .copied()
            .filter(move |n| matches!(self.kind(*n), NodeKind::StartEvent { .. }))
    }

    pub fn timer_start_events(&self, process: ProcessId) -> impl Iterator<Item = NodeId> + '_ {
        self.start_events(process).filter(move |n| {
            matches!(
                self.kind(*n),
                NodeKind::StartEvent { definition: Some(EventDef::Timer(_)) }
            )
        })
    }

    /// The one and only outgoing edge of `node`, `None` if there is none.
    pub fn single_outgoing_edge(&self, node: NodeId) -> EngineResult<Option<EdgeId>> {
        let outgoing = &self.node(node).outgoing;
        match outgoing.len() {
            0 => Ok(None),
            1 => Ok(Some(outgoing[0])),
            count => Err(EngineError::AmbiguousOutgoing {
                node: self.node(node).key.clone(),
                count,
            }),
        }
    }
}
