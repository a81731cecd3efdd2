use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::GraphError;
use crate::graph::{
    Assignment, EventDefinition, GraphNode, Incoming, NodeIndex, NodeKind, ProcessGraph,
    Subprocess, Transition,
};

/// Fluent construction of a [`ProcessGraph`]. Nodes and flows are collected
/// in declaration order; `build` validates the result and splices the
/// synthetic boundary parents.
pub struct GraphBuilder {
    name: String,
    nodes: Vec<(String, NodeKind)>,
    flows: Vec<FlowDef>,
    attachments: Vec<(String, String)>,
}

struct FlowDef {
    id: String,
    from: String,
    to: String,
    condition: Option<String>,
}

impl GraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            flows: Vec::new(),
            attachments: Vec::new(),
        }
    }

    pub fn start_event(mut self, id: &str) -> Self {
        self.nodes.push((id.to_string(), NodeKind::StartEvent));
        self
    }

    pub fn end_event(mut self, id: &str) -> Self {
        self.nodes.push((id.to_string(), NodeKind::EndEvent));
        self
    }

    pub fn task(mut self, id: &str) -> Self {
        self.nodes.push((id.to_string(), NodeKind::NoneTask));
        self
    }

    pub fn user_task(mut self, id: &str) -> Self {
        self.nodes.push((id.to_string(), NodeKind::UserTask));
        self
    }

    pub fn manual_task(mut self, id: &str) -> Self {
        self.nodes.push((id.to_string(), NodeKind::ManualTask));
        self
    }

    pub fn script_task(mut self, id: &str, script: &str) -> Self {
        self.nodes.push((
            id.to_string(),
            NodeKind::ScriptTask { script: script.to_string() },
        ));
        self
    }

    pub fn exclusive_gateway(mut self, id: &str) -> Self {
        self.nodes.push((id.to_string(), NodeKind::ExclusiveGateway));
        self
    }

    pub fn parallel_gateway(mut self, id: &str) -> Self {
        self.nodes.push((id.to_string(), NodeKind::ParallelGateway));
        self
    }

    pub fn inclusive_gateway(mut self, id: &str) -> Self {
        self.nodes.push((id.to_string(), NodeKind::InclusiveGateway));
        self
    }

    pub fn message_event(mut self, id: &str, message: &str) -> Self {
        self.nodes.push((
            id.to_string(),
            NodeKind::IntermediateCatchEvent {
                event: EventDefinition::Message { name: message.to_string() },
            },
        ));
        self
    }

    pub fn timer_event(mut self, id: &str, delay_ms: i64) -> Self {
        self.nodes.push((
            id.to_string(),
            NodeKind::IntermediateCatchEvent { event: EventDefinition::Timer { delay_ms } },
        ));
        self
    }

    /// Boundary message event attached to the activity `host`.
    pub fn boundary_message(mut self, id: &str, host: &str, message: &str) -> Self {
        self.nodes.push((
            id.to_string(),
            NodeKind::BoundaryEvent {
                event: EventDefinition::Message { name: message.to_string() },
            },
        ));
        self.attachments.push((id.to_string(), host.to_string()));
        self
    }

    /// Boundary timer event attached to the activity `host`.
    pub fn boundary_timer(mut self, id: &str, host: &str, delay_ms: i64) -> Self {
        self.nodes.push((
            id.to_string(),
            NodeKind::BoundaryEvent { event: EventDefinition::Timer { delay_ms } },
        ));
        self.attachments.push((id.to_string(), host.to_string()));
        self
    }

    /// Call activity running a graph known at build time.
    pub fn call_activity(self, id: &str, graph: Arc<ProcessGraph>) -> CallBuilder {
        CallBuilder {
            graph_builder: self,
            id: id.to_string(),
            subprocess: Subprocess::Static(graph),
            out_assign: Vec::new(),
        }
    }

    /// Call activity resolved by name when the task is reached.
    pub fn call_named(self, id: &str, process: &str) -> CallBuilder {
        CallBuilder {
            graph_builder: self,
            id: id.to_string(),
            subprocess: Subprocess::Named(process.to_string()),
            out_assign: Vec::new(),
        }
    }

    pub fn flow(mut self, id: &str, from: &str, to: &str) -> Self {
        self.flows.push(FlowDef {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            condition: None,
        });
        self
    }

    pub fn flow_if(mut self, id: &str, from: &str, to: &str, condition: &str) -> Self {
        self.flows.push(FlowDef {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            condition: Some(condition.to_string()),
        });
        self
    }

    pub fn build(mut self) -> Result<ProcessGraph, GraphError> {
        self.splice_boundaries()?;

        let mut index: HashMap<String, NodeIndex> = HashMap::new();
        for (i, (id, _)) in self.nodes.iter().enumerate() {
            if id.contains(':') || id.contains(';') {
                return Err(GraphError::ReservedChars(id.clone()));
            }
            if index.insert(id.clone(), i).is_some() {
                return Err(GraphError::DuplicateNode(id.clone()));
            }
        }

        let mut nodes: Vec<GraphNode> = self
            .nodes
            .into_iter()
            .map(|(id, kind)| GraphNode { id, kind, outgoing: Vec::new(), incoming: Vec::new() })
            .collect();

        let mut flow_ids = HashSet::new();
        for flow in &self.flows {
            if flow.id.contains(':') || flow.id.contains(';') {
                return Err(GraphError::ReservedChars(flow.id.clone()));
            }
            let source = *index.get(&flow.from).ok_or_else(|| GraphError::UnknownNode {
                flow: flow.id.clone(),
                node: flow.from.clone(),
            })?;
            let target = *index.get(&flow.to).ok_or_else(|| GraphError::UnknownNode {
                flow: flow.id.clone(),
                node: flow.to.clone(),
            })?;
            if !flow_ids.insert(flow.id.clone()) {
                return Err(GraphError::DuplicateFlow {
                    node: flow.from.clone(),
                    flow: flow.id.clone(),
                });
            }
            match nodes[source].kind {
                NodeKind::EndEvent => {
                    return Err(GraphError::EndWithOutgoing(flow.from.clone()));
                }
                NodeKind::ExclusiveGateway | NodeKind::InclusiveGateway => {}
                _ => {
                    if flow.condition.is_some() {
                        return Err(GraphError::MisplacedCondition { flow: flow.id.clone() });
                    }
                }
            }
            if matches!(nodes[target].kind, NodeKind::BoundaryEvent { .. })
                && !matches!(nodes[source].kind, NodeKind::BoundarySplit)
            {
                return Err(GraphError::FlowIntoBoundary {
                    flow: flow.id.clone(),
                    event: flow.to.clone(),
                });
            }
            nodes[source].outgoing.push(Transition {
                id: flow.id.clone(),
                target,
                condition: flow.condition.clone(),
            });
            nodes[target].incoming.push(Incoming { id: flow.id.clone(), source });
        }

        let starts: Vec<NodeIndex> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n.kind, NodeKind::StartEvent))
            .map(|(i, _)| i)
            .collect();
        if starts.len() != 1 {
            return Err(GraphError::StartCount(self.name));
        }
        let start = starts[0];

        // The start event's id names the root task in saved workflow
        // states, so no flow may take it.
        if flow_ids.contains(&nodes[start].id) {
            return Err(GraphError::StartIdReused(nodes[start].id.clone()));
        }

        Ok(ProcessGraph { name: self.name, nodes, start, index })
    }

    /// For each host with attached boundary events, insert a synthetic
    /// parent node: flows into the host are retargeted to it, and it fans
    /// out to the host and each event. The synthetic flow ids are the
    /// target node ids, which is what checkpoint markers carry.
    fn splice_boundaries(&mut self) -> Result<(), GraphError> {
        let mut hosts: Vec<(String, Vec<String>)> = Vec::new();
        for (event, host) in &self.attachments {
            match hosts.iter_mut().find(|(h, _)| h == host) {
                Some((_, events)) => events.push(event.clone()),
                None => hosts.push((host.clone(), vec![event.clone()])),
            }
        }

        for (host, events) in hosts {
            let host_kind = self.nodes.iter().find(|(id, _)| *id == host).map(|(_, k)| k);
            let valid = matches!(
                host_kind,
                Some(
                    NodeKind::NoneTask
                        | NodeKind::UserTask
                        | NodeKind::ManualTask
                        | NodeKind::ScriptTask { .. }
                        | NodeKind::CallActivity { .. }
                )
            );
            if !valid {
                return Err(GraphError::InvalidBoundaryHost {
                    event: events[0].clone(),
                    host,
                });
            }

            let split = format!("{host}.attached");
            self.nodes.push((split.clone(), NodeKind::BoundarySplit));
            for flow in &mut self.flows {
                if flow.to == host {
                    flow.to = split.clone();
                }
            }
            self.flows.push(FlowDef {
                id: host.clone(),
                from: split.clone(),
                to: host.clone(),
                condition: None,
            });
            for event in events {
                self.flows.push(FlowDef {
                    id: event.clone(),
                    from: split.clone(),
                    to: event,
                    condition: None,
                });
            }
        }
        Ok(())
    }
}

/// Sub-chain for call activities, in the style of the other node methods
/// but carrying the output mapping.
pub struct CallBuilder {
    graph_builder: GraphBuilder,
    id: String,
    subprocess: Subprocess,
    out_assign: Vec<Assignment>,
}

impl CallBuilder {
    /// Copy `from` out of the subprocess data into the task scope as `to`.
    pub fn out(mut self, from: &str, to: &str) -> Self {
        self.out_assign.push(Assignment { from: from.to_string(), to: to.to_string() });
        self
    }

    pub fn build(mut self) -> GraphBuilder {
        self.graph_builder.nodes.push((
            self.id,
            NodeKind::CallActivity {
                subprocess: self.subprocess,
                out_assign: self.out_assign,
            },
        ));
        self.graph_builder
    }
}
