use crate::dsl::{Branch, Edge, LoopDef, MultiInstanceDef, Node, NodeType, Process, TriggerDef};
use std::collections::HashMap;
use serde_json::Value;

/// 流程定义的链式构建器
pub struct ProcessBuilder {
    id: String,
    name: String,
    variables: HashMap<String, Value>,
    data_inputs: Vec<String>,
    data_outputs: Vec<String>,
    pub nodes: Vec<Node>, // public for manual manipulation in tests
    edges: Vec<Edge>,
}

impl ProcessBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            variables: HashMap::new(),
            data_inputs: Vec::new(),
            data_outputs: Vec::new(),
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

    pub fn data_input(mut self, name: &str) -> Self {
        self.data_inputs.push(name.to_string());
        self
    }

    pub fn data_output(mut self, name: &str) -> Self {
        self.data_outputs.push(name.to_string());
        self
    }

    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    fn push(self, id: &str, kind: NodeType) -> Self {
        self.node(Node::new(id, kind))
    }

    pub fn start(self, id: &str) -> Self {
        self.push(id, NodeType::Start)
    }

    pub fn end(self, id: &str) -> Self {
        self.push(id, NodeType::End)
    }

    pub fn error_end(self, id: &str, code: Option<&str>) -> Self {
        self.push(id, NodeType::ErrorEnd { code: code.map(str::to_string) })
    }

    pub fn cancel_end(self, id: &str) -> Self {
        self.push(id, NodeType::CancelEnd)
    }

    pub fn terminate_end(self, id: &str) -> Self {
        self.push(id, NodeType::TerminateEnd)
    }

    pub fn script(self, id: &str, script: &str) -> Self {
        self.push(id, NodeType::Script { script: script.to_string() })
    }

    pub fn user(self, id: &str) -> Self {
        self.push(id, NodeType::User)
    }

    pub fn manual(self, id: &str) -> Self {
        self.push(id, NodeType::Manual)
    }

    pub fn service(self, id: &str, operator: &str) -> ServiceBuilder {
        ServiceBuilder {
            process_builder: self,
            id: id.to_string(),
            operator: operator.to_string(),
            params: HashMap::new(),
            result: None,
        }
    }

    pub fn business_rule(self, id: &str, decision: &str) -> Self {
        self.push(id, NodeType::BusinessRule { decision: decision.to_string() })
    }

    pub fn exclusive(self, id: &str) -> Self {
        self.push(id, NodeType::Exclusive)
    }

    pub fn inclusive(self, id: &str) -> Self {
        self.push(id, NodeType::Inclusive)
    }

    pub fn parallel_gateway(self, id: &str) -> Self {
        self.push(id, NodeType::ParallelGateway)
    }

    pub fn catch_event(self, id: &str, trigger: TriggerDef) -> Self {
        self.push(id, NodeType::CatchEvent { trigger })
    }

    pub fn throw_event(self, id: &str, trigger: TriggerDef) -> Self {
        self.push(id, NodeType::ThrowEvent { trigger })
    }

    pub fn boundary(self, id: &str, attached_to: &str, trigger: TriggerDef) -> Self {
        self.push(id, NodeType::Boundary {
            attached_to: attached_to.to_string(),
            trigger,
            interrupting: true,
        })
    }

    pub fn non_interrupting_boundary(self, id: &str, attached_to: &str, trigger: TriggerDef) -> Self {
        self.push(id, NodeType::Boundary {
            attached_to: attached_to.to_string(),
            trigger,
            interrupting: false,
        })
    }

    pub fn subprocess(self, id: &str, inner: ProcessBuilder) -> Self {
        self.push(id, NodeType::SubProcess { nodes: inner.nodes, edges: inner.edges })
    }

    pub fn transaction(self, id: &str, inner: ProcessBuilder) -> Self {
        self.push(id, NodeType::Transaction { nodes: inner.nodes, edges: inner.edges })
    }

    pub fn call_activity(self, id: &str, process: &str) -> Self {
        self.push(id, NodeType::CallActivity { process: process.to_string() })
    }

    /// 添加并行块
    pub fn parallel(self, id: &str, branches: Vec<Vec<Node>>) -> Self {
        let branches = branches.into_iter()
            .map(|nodes| Branch { nodes })
            .collect();
        self.push(id, NodeType::ParallelBlock { branches })
    }

    // --- decorators for the most recently added node ---

    fn last_mut(&mut self) -> Option<&mut Node> {
        self.nodes.last_mut()
    }

    pub fn named(mut self, label: &str) -> Self {
        if let Some(node) = self.last_mut() {
            node.name = Some(label.to_string());
        }
        self
    }

    pub fn prescript(mut self, script: &str) -> Self {
        if let Some(node) = self.last_mut() {
            node.prescript = Some(script.to_string());
        }
        self
    }

    pub fn postscript(mut self, script: &str) -> Self {
        if let Some(node) = self.last_mut() {
            node.postscript = Some(script.to_string());
        }
        self
    }

    pub fn outputs(mut self, names: &[&str]) -> Self {
        if let Some(node) = self.last_mut() {
            node.outputs = names.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    pub fn looping(mut self, def: LoopDef) -> Self {
        if let Some(node) = self.last_mut() {
            node.loop_def = Some(def);
        }
        self
    }

    // --- edges ---

    pub fn connect(mut self, source: &str, target: &str) -> Self {
        self.edges.push(Edge::new(source, target));
        self
    }

    pub fn connect_if(mut self, source: &str, target: &str, condition: &str) -> Self {
        let mut edge = Edge::new(source, target);
        edge.condition = Some(condition.to_string());
        self.edges.push(edge);
        self
    }

    pub fn connect_default(mut self, source: &str, target: &str) -> Self {
        let mut edge = Edge::new(source, target);
        edge.default = true;
        self.edges.push(edge);
        self
    }

    pub fn build(self) -> Process {
        Process {
            id: self.id,
            name: self.name,
            variables: self.variables,
            data_inputs: self.data_inputs,
            data_outputs: self.data_outputs,
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

pub struct ServiceBuilder {
    process_builder: ProcessBuilder,
    id: String,
    operator: String,
    params: HashMap<String, Value>,
    result: Option<String>,
}

impl ServiceBuilder {
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn result(mut self, var_name: &str) -> Self {
        self.result = Some(var_name.to_string());
        self
    }

    pub fn build(self) -> ProcessBuilder {
        self.process_builder.push(&self.id, NodeType::Service {
            operator: self.operator,
            params: self.params,
            result: self.result,
        })
    }
}

impl TriggerDef {
    pub fn error(code: Option<&str>) -> Self {
        TriggerDef::Error { code: code.map(str::to_string) }
    }

    pub fn message(name: &str) -> Self {
        TriggerDef::Message { name: name.to_string() }
    }

    pub fn signal(name: &str) -> Self {
        TriggerDef::Signal { name: name.to_string() }
    }

    pub fn timer(timer: &str) -> Self {
        TriggerDef::Timer { timer: timer.to_string() }
    }
}

impl LoopDef {
    pub fn parallel_over(collection: &str, input_item: &str) -> Self {
        LoopDef::Parallel(MultiInstanceDef {
            collection: Some(collection.to_string()),
            input_item: Some(input_item.to_string()),
            ..Default::default()
        })
    }

    pub fn sequential_over(collection: &str, input_item: &str) -> Self {
        LoopDef::Sequential(MultiInstanceDef {
            collection: Some(collection.to_string()),
            input_item: Some(input_item.to_string()),
            ..Default::default()
        })
    }

    /// Sets the output item/collection on a multi-instance marker; no-op for standard loops.
    pub fn collect_into(mut self, output_item: &str, output_collection: &str) -> Self {
        if let LoopDef::Parallel(def) | LoopDef::Sequential(def) = &mut self {
            def.output_item = Some(output_item.to_string());
            def.output_collection = Some(output_collection.to_string());
        }
        self
    }

    pub fn standard(condition: &str, maximum: Option<usize>) -> Self {
        LoopDef::Standard {
            condition: condition.to_string(),
            test_before: false,
            maximum,
        }
    }
}
