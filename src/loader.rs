use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::graph::builder::GraphBuilder;
use crate::graph::{ProcessGraph, SubprocessResolver};
use crate::runtime::workflow::{EngineServices, Workflow};

/// YAML surface of one definition file. Call nodes reference other
/// processes by id; same-file and cross-file references behave the same
/// once the set resolves them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessSetDef {
    pub processes: Vec<ProcessDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessDef {
    pub id: String,
    pub nodes: Vec<NodeDef>,
    pub flows: Vec<FlowDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeDef {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKindDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKindDef {
    Start,
    End,
    Task,
    UserTask,
    ManualTask,
    ScriptTask {
        script: String,
    },
    ExclusiveGateway,
    ParallelGateway,
    InclusiveGateway,
    MessageEvent {
        message: String,
    },
    TimerEvent {
        delay_ms: i64,
    },
    BoundaryMessage {
        host: String,
        message: String,
    },
    BoundaryTimer {
        host: String,
        delay_ms: i64,
    },
    Call {
        calls: String,
        #[serde(default)]
        out: Vec<OutDef>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutDef {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowDef {
    pub id: String,
    pub from: String,
    pub to: String,
    pub condition: Option<String>,
}

fn build_process(def: &ProcessDef) -> Result<ProcessGraph> {
    let mut builder = GraphBuilder::new(&def.id);
    for node in &def.nodes {
        let id = node.id.as_str();
        builder = match &node.kind {
            NodeKindDef::Start => builder.start_event(id),
            NodeKindDef::End => builder.end_event(id),
            NodeKindDef::Task => builder.task(id),
            NodeKindDef::UserTask => builder.user_task(id),
            NodeKindDef::ManualTask => builder.manual_task(id),
            NodeKindDef::ScriptTask { script } => builder.script_task(id, script),
            NodeKindDef::ExclusiveGateway => builder.exclusive_gateway(id),
            NodeKindDef::ParallelGateway => builder.parallel_gateway(id),
            NodeKindDef::InclusiveGateway => builder.inclusive_gateway(id),
            NodeKindDef::MessageEvent { message } => builder.message_event(id, message),
            NodeKindDef::TimerEvent { delay_ms } => builder.timer_event(id, *delay_ms),
            NodeKindDef::BoundaryMessage { host, message } => {
                builder.boundary_message(id, host, message)
            }
            NodeKindDef::BoundaryTimer { host, delay_ms } => {
                builder.boundary_timer(id, host, *delay_ms)
            }
            NodeKindDef::Call { calls, out } => {
                let mut call = builder.call_named(id, calls);
                for o in out {
                    call = call.out(&o.from, &o.to);
                }
                call.build()
            }
        };
    }
    for flow in &def.flows {
        builder = match &flow.condition {
            Some(condition) => builder.flow_if(&flow.id, &flow.from, &flow.to, condition),
            None => builder.flow(&flow.id, &flow.from, &flow.to),
        };
    }
    builder.build().with_context(|| format!("invalid process '{}'", def.id))
}

/// Built graphs from one or more definition files, addressable by process
/// id. The set resolves call activities, so processes may call each other
/// or themselves.
#[derive(Debug)]
pub struct ProcessSet {
    graphs: HashMap<String, Arc<ProcessGraph>>,
}

impl ProcessSet {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let def: ProcessSetDef =
            serde_yaml::from_str(yaml).context("failed to deserialize process definitions")?;
        let mut graphs = HashMap::new();
        for process in &def.processes {
            let graph = build_process(process)?;
            if graphs.insert(process.id.clone(), Arc::new(graph)).is_some() {
                bail!("duplicate process id '{}'", process.id);
            }
        }
        Ok(Self { graphs })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("failed to read YAML file from {}", path.display()))?;
        Self::from_yaml(&yaml)
            .with_context(|| format!("failed to load processes from {}", path.display()))
    }

    pub fn get(&self, id: &str) -> Option<Arc<ProcessGraph>> {
        self.graphs.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.graphs.keys().map(String::as_str).collect();
        ids.sort();
        ids
    }

    /// Start the named process with this set as its subprocess resolver.
    pub fn start(self: &Arc<Self>, id: &str) -> Result<Workflow, EngineError> {
        self.start_with(id, EngineServices::default())
    }

    pub fn start_with(
        self: &Arc<Self>,
        id: &str,
        mut services: EngineServices,
    ) -> Result<Workflow, EngineError> {
        let graph = self.get(id).ok_or_else(|| EngineError::UnresolvedSubprocess(id.to_string()))?;
        services.resolver = Arc::clone(self) as Arc<dyn SubprocessResolver>;
        Ok(Workflow::with_services(graph, services))
    }
}

impl SubprocessResolver for ProcessSet {
    fn resolve(&self, name: &str) -> Result<Arc<ProcessGraph>, EngineError> {
        self.get(name).ok_or_else(|| EngineError::UnresolvedSubprocess(name.to_string()))
    }
}

/// Resolves call activities against `<name>.yaml` files in a directory,
/// parsed on first use and cached.
pub struct FileSetResolver {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Arc<ProcessGraph>>>,
}

impl FileSetResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), cache: Mutex::new(HashMap::new()) }
    }
}

impl SubprocessResolver for FileSetResolver {
    fn resolve(&self, name: &str) -> Result<Arc<ProcessGraph>, EngineError> {
        if let Some(graph) = self.cache.lock().unwrap().get(name) {
            return Ok(Arc::clone(graph));
        }
        let path = self.dir.join(format!("{name}.yaml"));
        let set = ProcessSet::from_file(&path)
            .map_err(|e| EngineError::UnresolvedSubprocess(format!("{name}: {e:#}")))?;
        let mut cache = self.cache.lock().unwrap();
        for (id, graph) in &set.graphs {
            cache.entry(id.clone()).or_insert_with(|| Arc::clone(graph));
        }
        cache
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnresolvedSubprocess(name.to_string()))
    }
}
