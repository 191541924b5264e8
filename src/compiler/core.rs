use std::collections::HashMap;

use serde_json::Map;

use crate::dsl::{Collaboration, EventDefinition, Node, NodeType};
use crate::error::GraphError;
use crate::runtime::graph::{
    EdgeId, EdgeKind, EventDef, Expression, GraphEdge, GraphNode, LaneDef, LaneId, MessageDef, NodeId, NodeKind,
    ProcessDef, ProcessGraph, ProcessId, SendSpec, TaskKind, TimerDef,
};

/// Turns a [`Collaboration`] into an immutable [`ProcessGraph`].
///
/// String ids are resolved to dense indices, so the runtime never looks a
/// node up by name.
#[derive(Debug, Default)]
pub struct Compiler {
    node_map: HashMap<String, NodeId>,
    edge_map: HashMap<String, EdgeId>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compile(&mut self, collaboration: Collaboration) -> Result<ProcessGraph, GraphError> {
        self.node_map.clear();
        self.edge_map.clear();

        // 1. Index processes and nodes
        let mut processes = Vec::with_capacity(collaboration.processes.len());
        let mut process_keys = HashMap::new();
        let mut node_process = Vec::new();
        for (p_idx, process) in collaboration.processes.iter().enumerate() {
            let pid = ProcessId(p_idx);
            if process_keys.insert(process.id.clone(), pid).is_some() {
                return Err(GraphError::DuplicateProcess(process.id.clone()));
            }
            let mut members = Vec::with_capacity(process.nodes.len());
            for node in &process.nodes {
                let id = NodeId(node_process.len());
                if self.node_map.insert(node.id.clone(), id).is_some() {
                    return Err(GraphError::DuplicateNode(node.id.clone()));
                }
                node_process.push(pid);
                members.push(id);
            }
            processes.push(ProcessDef {
                id: pid,
                key: process.id.clone(),
                name: process.name.clone(),
                variables: process.variables.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<Map<_, _>>(),
                nodes: members,
            });
        }

        // 2. Edges: sequence flows first, then message flows
        let mut edges = Vec::new();
        for (p_idx, process) in collaboration.processes.iter().enumerate() {
            for edge in &process.edges {
                let key = edge.effective_id();
                let context = format!("sequence flow '{}'", key);
                let source = self.resolve(&edge.source, &context)?;
                let target = self.resolve(&edge.target, &context)?;
                if node_process[source.0] != ProcessId(p_idx) || node_process[target.0] != ProcessId(p_idx) {
                    return Err(GraphError::CrossProcessFlow(key));
                }
                let id = self.register_edge(&key, edges.len())?;
                edges.push(GraphEdge {
                    id,
                    key,
                    source,
                    target,
                    kind: EdgeKind::Sequence {
                        rule: edge.condition.as_deref().map(Expression::new),
                        operation: edge.operation.as_deref().map(Expression::new),
                    },
                });
            }
        }
        let mut message_flows = Vec::with_capacity(collaboration.message_flows.len());
        for flow in &collaboration.message_flows {
            let key = flow.effective_id();
            let context = format!("message flow '{}'", key);
            let source = self.resolve(&flow.source, &context)?;
            let target = self.resolve(&flow.target, &context)?;
            let id = self.register_edge(&key, edges.len())?;
            edges.push(GraphEdge {
                id,
                key,
                source,
                target,
                kind: EdgeKind::Message {
                    connect: flow.connect.as_deref().map(Expression::new),
                },
            });
            message_flows.push(id);
        }

        // 3. Lanes
        let mut lanes = Vec::new();
        let mut node_lane: HashMap<NodeId, LaneId> = HashMap::new();
        for (p_idx, process) in collaboration.processes.iter().enumerate() {
            for lane in &process.lanes {
                let lane_id = LaneId(lanes.len());
                let context = format!("lane '{}'", lane.id);
                for member in &lane.nodes {
                    let node = self.resolve(member, &context)?;
                    if node_process[node.0] != ProcessId(p_idx) || node_lane.insert(node, lane_id).is_some() {
                        return Err(GraphError::InvalidLaneMember {
                            lane: lane.id.clone(),
                            node: member.clone(),
                        });
                    }
                }
                lanes.push(LaneDef {
                    id: lane_id,
                    key: lane.id.clone(),
                    name: lane.name.clone(),
                    process: ProcessId(p_idx),
                    actor_rule: lane.actor_rule.as_deref().map(Expression::new),
                });
            }
        }

        // 4. Nodes
        let mut nodes = Vec::with_capacity(node_process.len());
        for process in &collaboration.processes {
            for node in &process.nodes {
                let id = NodeId(nodes.len());
                let kind = self.transform_node(node, &edges)?;
                nodes.push(GraphNode {
                    id,
                    key: node.id.clone(),
                    name: node.name.clone().unwrap_or_else(|| node.id.clone()),
                    process: node_process[id.0],
                    lane: node_lane.get(&id).copied(),
                    kind,
                    outgoing: Vec::new(),
                    incoming: Vec::new(),
                });
            }
        }

        // 5. Adjacency, sequence flows only, in definition order
        for edge in &edges {
            if matches!(edge.kind, EdgeKind::Sequence { .. }) {
                nodes[edge.source.0].outgoing.push(edge.id);
                nodes[edge.target.0].incoming.push(edge.id);
            }
        }

        // 6. Boundary events register on their task
        for idx in 0..nodes.len() {
            let NodeKind::BoundaryEvent { attached_to, .. } = nodes[idx].kind else {
                continue;
            };
            let event = nodes[idx].id;
            match &mut nodes[attached_to.0].kind {
                NodeKind::Task { boundary_events, .. } => boundary_events.push(event),
                _ => {
                    return Err(GraphError::InvalidAttachment {
                        event: nodes[idx].key.clone(),
                        target: nodes[attached_to.0].key.clone(),
                    });
                }
            }
        }

        Ok(ProcessGraph {
            id: collaboration.id,
            name: collaboration.name,
            processes,
            lanes,
            nodes,
            edges,
            message_flows,
            node_index: self.node_map.clone(),
        })
    }

    fn transform_node(&self, node: &Node, edges: &[GraphEdge]) -> Result<NodeKind, GraphError> {
        let kind = match &node.kind {
            NodeType::StartEvent { definition } => NodeKind::StartEvent {
                definition: definition.as_ref().map(event_def),
            },
            NodeType::EndEvent => NodeKind::EndEvent,
            NodeType::ManualTask => NodeKind::Task {
                kind: TaskKind::Manual,
                boundary_events: Vec::new(),
            },
            NodeType::SendTask { receivers, subject, body } => NodeKind::Task {
                kind: TaskKind::Send(SendSpec {
                    receivers: receivers.as_deref().map(Expression::new),
                    subject: subject.clone(),
                    body: body.clone(),
                }),
                boundary_events: Vec::new(),
            },
            NodeType::ServiceTask { action } => NodeKind::Task {
                kind: TaskKind::Service {
                    action: action.as_deref().map(Expression::new),
                },
                boundary_events: Vec::new(),
            },
            NodeType::ExclusiveGateway { default_flow, automatic } => {
                let default_flow = match default_flow {
                    Some(flow) => Some(self.resolve_default_flow(node, flow, edges)?),
                    None => None,
                };
                NodeKind::ExclusiveGateway {
                    default_flow,
                    automatic: *automatic,
                }
            }
            NodeType::ParallelGateway => NodeKind::ParallelGateway,
            NodeType::BoundaryEvent {
                attached_to,
                definition,
                cancel_activity,
            } => NodeKind::BoundaryEvent {
                attached_to: self.resolve(attached_to, &format!("boundary event '{}'", node.id))?,
                definition: definition.as_ref().map(event_def),
                cancel_activity: *cancel_activity,
            },
            NodeType::IntermediateThrowEvent { definition } => NodeKind::IntermediateThrowEvent {
                definition: definition.as_ref().map(event_def),
            },
        };
        Ok(kind)
    }

    fn resolve_default_flow(&self, gateway: &Node, flow: &str, edges: &[GraphEdge]) -> Result<EdgeId, GraphError> {
        let gateway_id = self.node_map.get(&gateway.id).copied();
        self.edge_map
            .get(flow)
            .copied()
            .filter(|e| {
                let edge = &edges[e.0];
                matches!(edge.kind, EdgeKind::Sequence { .. }) && Some(edge.source) == gateway_id
            })
            .ok_or_else(|| GraphError::InvalidDefaultFlow {
                gateway: gateway.id.clone(),
                flow: flow.to_string(),
            })
    }

    fn register_edge(&mut self, key: &str, index: usize) -> Result<EdgeId, GraphError> {
        let id = EdgeId(index);
        if self.edge_map.insert(key.to_string(), id).is_some() {
            return Err(GraphError::DuplicateEdge(key.to_string()));
        }
        Ok(id)
    }

    fn resolve(&self, node: &str, context: &str) -> Result<NodeId, GraphError> {
        self.node_map
            .get(node)
            .copied()
            .ok_or_else(|| GraphError::UnknownNode {
                node: node.to_string(),
                context: context.to_string(),
            })
    }
}

fn event_def(definition: &EventDefinition) -> EventDef {
    match definition {
        EventDefinition::Timer { delay_ms } => EventDef::Timer(TimerDef { delay_ms: *delay_ms }),
        EventDefinition::Message { name } => EventDef::Message(MessageDef { name: name.clone() }),
    }
}
