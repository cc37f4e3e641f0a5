use std::collections::HashMap;
use std::sync::Arc;
use dashmap::DashMap;
use serde_json::Value;
use tracing::info;
use crate::actions::{DecisionTable, ServiceHandler};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::runtime::blueprint::SpecGraph;
use crate::runtime::context::Data;
use crate::runtime::expression::ScriptEngine;
use crate::runtime::instance::ProcessInstance;

/// Shared, read-only collaborators of every process instance.
pub struct Engine {
    // Compiled graphs, also the lookup table for call activities
    processes: DashMap<String, Arc<SpecGraph>>,
    services: HashMap<String, Arc<dyn ServiceHandler>>,
    decisions: HashMap<String, Arc<dyn DecisionTable>>,
    scripts: ScriptEngine,
    config: EngineConfig,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            processes: DashMap::new(),
            services: HashMap::new(),
            decisions: HashMap::new(),
            scripts: ScriptEngine::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn register_process(&self, graph: SpecGraph) -> Arc<SpecGraph> {
        let graph = Arc::new(graph);
        info!(process = %graph.id, specs = graph.specs.len(), "Registered process");
        self.processes.insert(graph.id.clone(), graph.clone());
        graph
    }

    pub fn register_service(&mut self, handler: Arc<dyn ServiceHandler>) {
        self.services.insert(handler.name().to_string(), handler);
    }

    pub fn register_decision(&mut self, table: Arc<dyn DecisionTable>) {
        self.decisions.insert(table.name().to_string(), table);
    }

    /// Makes `name(args…)` callable from every guard, condition and script.
    pub fn register_function<F>(&mut self, name: &str, function: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.scripts.register(name, Arc::new(function));
    }

    pub fn process(&self, id: &str) -> Option<Arc<SpecGraph>> {
        self.processes.get(id).map(|entry| entry.value().clone())
    }

    pub fn service(&self, name: &str) -> Option<&Arc<dyn ServiceHandler>> {
        self.services.get(name)
    }

    pub fn decision(&self, name: &str) -> Option<&Arc<dyn DecisionTable>> {
        self.decisions.get(name)
    }

    pub fn scripts(&self) -> &ScriptEngine {
        &self.scripts
    }

    pub fn instantiate(self: &Arc<Self>, id: &str) -> Result<ProcessInstance, EngineError> {
        self.instantiate_with(id, Data::new())
    }

    /// `data` overrides the process's default variables.
    pub fn instantiate_with(self: &Arc<Self>, id: &str, data: Data) -> Result<ProcessInstance, EngineError> {
        let graph = self
            .process(id)
            .ok_or_else(|| EngineError::ProcessNotFound(id.to_string()))?;
        Ok(self.instantiate_graph(graph, data))
    }

    pub fn instantiate_graph(self: &Arc<Self>, graph: Arc<SpecGraph>, data: Data) -> ProcessInstance {
        ProcessInstance::new(Arc::clone(self), graph, data)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
