use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::runtime::graph::{NodeId, ProcessGraph};
use crate::runtime::instance::ProcessInstance;
use crate::services::InstanceFactory;

/// Creates plain instances seeded with the process' declared variables.
#[derive(Debug, Default)]
pub struct DefaultInstanceFactory;

impl InstanceFactory for DefaultInstanceFactory {
    fn create(&self, graph: &Arc<ProcessGraph>, start: NodeId, now: DateTime<Utc>) -> Result<ProcessInstance> {
        let process = graph.node(start).process;
        let mut instance = ProcessInstance::new(graph.clone(), process, now);
        instance.variables = graph.process(process).variables.clone();
        Ok(instance)
    }
}
