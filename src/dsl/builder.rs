use crate::dsl::{Collaboration, Edge, EventDefinition, Lane, MessageFlow, Node, NodeType, Process};
use std::collections::HashMap;
use serde_json::Value;

pub struct CollaborationBuilder {
    id: String,
    name: String,
    processes: Vec<Process>,
    message_flows: Vec<MessageFlow>,
}

impl CollaborationBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            processes: Vec::new(),
            message_flows: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn process(mut self, process: Process) -> Self {
        self.processes.push(process);
        self
    }

    pub fn message_flow(mut self, source: &str, target: &str) -> Self {
        self.message_flows.push(MessageFlow {
            id: None,
            source: source.to_string(),
            target: target.to_string(),
            connect: None,
        });
        self
    }

    pub fn message_flow_with_connect(mut self, source: &str, target: &str, connect: &str) -> Self {
        self.message_flows.push(MessageFlow {
            id: None,
            source: source.to_string(),
            target: target.to_string(),
            connect: Some(connect.to_string()),
        });
        self
    }

    pub fn build(self) -> Collaboration {
        Collaboration {
            id: self.id,
            name: self.name,
            processes: self.processes,
            message_flows: self.message_flows,
        }
    }
}

pub struct ProcessBuilder {
    id: String,
    name: String,
    variables: HashMap<String, Value>,
    lanes: Vec<Lane>,
    pub nodes: Vec<Node>, // public for manual manipulation in tests
    edges: Vec<Edge>,
}

impl ProcessBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            variables: HashMap::new(),
            lanes: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(key.to_string(), value.into());
        self
    }

    pub fn lane(mut self, id: &str, actor_rule: Option<&str>, nodes: &[&str]) -> Self {
        self.lanes.push(Lane {
            id: id.to_string(),
            name: id.to_string(),
            actor_rule: actor_rule.map(str::to_string),
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
        });
        self
    }

    fn node(mut self, id: &str, kind: NodeType) -> Self {
        self.nodes.push(Node {
            id: id.to_string(),
            name: None,
            kind,
        });
        self
    }

    pub fn start(self, id: &str) -> Self {
        self.node(id, NodeType::StartEvent { definition: None })
    }

    pub fn timer_start(self, id: &str, delay_ms: u64) -> Self {
        self.node(id, NodeType::StartEvent {
            definition: Some(EventDefinition::Timer { delay_ms }),
        })
    }

    pub fn message_start(self, id: &str) -> Self {
        self.node(id, NodeType::StartEvent {
            definition: Some(EventDefinition::Message { name: None }),
        })
    }

    pub fn end(self, id: &str) -> Self {
        self.node(id, NodeType::EndEvent)
    }

    pub fn manual_task(self, id: &str) -> Self {
        self.node(id, NodeType::ManualTask)
    }

    pub fn service_task(self, id: &str) -> Self {
        self.node(id, NodeType::ServiceTask { action: None })
    }

    pub fn service_task_with_action(self, id: &str, action: &str) -> Self {
        self.node(id, NodeType::ServiceTask {
            action: Some(action.to_string()),
        })
    }

    pub fn send_task(self, id: &str) -> SendTaskBuilder {
        SendTaskBuilder {
            process_builder: self,
            id: id.to_string(),
            receivers: None,
            subject: String::new(),
            body: String::new(),
        }
    }

    /// Exclusive gateway decided by the engine.
    pub fn exclusive_gateway(self, id: &str) -> Self {
        self.node(id, NodeType::ExclusiveGateway {
            default_flow: None,
            automatic: true,
        })
    }

    /// Exclusive gateway left to a user decision.
    pub fn decision(self, id: &str) -> Self {
        self.node(id, NodeType::ExclusiveGateway {
            default_flow: None,
            automatic: false,
        })
    }

    pub fn parallel_gateway(self, id: &str) -> Self {
        self.node(id, NodeType::ParallelGateway)
    }

    pub fn boundary_timer(self, id: &str, attached_to: &str, delay_ms: u64, cancel_activity: bool) -> Self {
        self.node(id, NodeType::BoundaryEvent {
            attached_to: attached_to.to_string(),
            definition: Some(EventDefinition::Timer { delay_ms }),
            cancel_activity,
        })
    }

    pub fn message_throw(self, id: &str) -> Self {
        self.node(id, NodeType::IntermediateThrowEvent {
            definition: Some(EventDefinition::Message { name: None }),
        })
    }

    pub fn intermediate_event(self, id: &str) -> Self {
        self.node(id, NodeType::IntermediateThrowEvent { definition: None })
    }

    pub fn connect(mut self, source: &str, target: &str) -> Self {
        self.edges.push(Edge {
            id: None,
            source: source.to_string(),
            target: target.to_string(),
            condition: None,
            operation: None,
        });
        self
    }

    pub fn connect_if(mut self, source: &str, target: &str, condition: &str) -> Self {
        self.edges.push(Edge {
            id: None,
            source: source.to_string(),
            target: target.to_string(),
            condition: Some(condition.to_string()),
            operation: None,
        });
        self
    }

    pub fn connect_with_operation(mut self, source: &str, target: &str, operation: &str) -> Self {
        self.edges.push(Edge {
            id: None,
            source: source.to_string(),
            target: target.to_string(),
            condition: None,
            operation: Some(operation.to_string()),
        });
        self
    }

    /// Connects and registers the edge as default flow of the source gateway.
    pub fn connect_default(mut self, source: &str, target: &str) -> Self {
        let edge_id = format!("{}->{}", source, target);
        for node in self.nodes.iter_mut().filter(|n| n.id == source) {
            if let NodeType::ExclusiveGateway { default_flow, .. } = &mut node.kind {
                *default_flow = Some(edge_id.clone());
            }
        }
        self.edges.push(Edge {
            id: Some(edge_id),
            source: source.to_string(),
            target: target.to_string(),
            condition: None,
            operation: None,
        });
        self
    }

    pub fn build(self) -> Process {
        Process {
            id: self.id,
            name: self.name,
            variables: self.variables,
            lanes: self.lanes,
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

pub struct SendTaskBuilder {
    process_builder: ProcessBuilder,
    id: String,
    receivers: Option<String>,
    subject: String,
    body: String,
}

impl SendTaskBuilder {
    pub fn receivers(mut self, rule: &str) -> Self {
        self.receivers = Some(rule.to_string());
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = subject.to_string();
        self
    }

    pub fn body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    pub fn build(self) -> ProcessBuilder {
        let kind = NodeType::SendTask {
            receivers: self.receivers,
            subject: self.subject,
            body: self.body,
        };
        self.process_builder.node(&self.id, kind)
    }
}
