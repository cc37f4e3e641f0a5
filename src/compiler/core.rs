use crate::dsl::{Edge, LoopDef, MultiInstanceDef, Node, NodeType, Process, TriggerDef};
use crate::runtime::blueprint::{
    Cardinality, EndKind, LoopCharacteristics, ServiceParam, SpecGraph, SpecIndex, TaskKind, TaskSpec, Transition,
};
use crate::runtime::expression::{Expression, Script};
use crate::runtime::signal::Trigger;
use crate::compiler::expander::Expander;
use std::collections::HashMap;
use std::sync::Arc;
use anyhow::{Context as AnyhowContext, Result, anyhow, bail};
use serde_json::Value;

const ROOT_NAME: &str = "Root";

/// Validates a definition and turns it into an immutable [`SpecGraph`].
pub struct Compiler {
    id_map: HashMap<String, SpecIndex>,
    in_transaction: bool,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            id_map: HashMap::new(),
            in_transaction: false,
        }
    }

    fn nested(in_transaction: bool) -> Self {
        Self {
            id_map: HashMap::new(),
            in_transaction,
        }
    }

    pub fn compile(&mut self, raw_process: Process) -> Result<SpecGraph> {
        self.id_map.clear();

        // 0. Pass 0: Expand
        let process = Expander::new().expand(raw_process)?;

        let mut graph = self
            .compile_graph(&process.id, &process.name, &process.nodes, &process.edges)
            .with_context(|| format!("Failed to compile process '{}'", process.id))?;
        graph.variables = process.variables;
        graph.data_inputs = process.data_inputs;
        graph.data_outputs = process.data_outputs;
        Ok(graph)
    }

    fn compile_graph(&mut self, id: &str, name: &str, nodes: &[Node], edges: &[Edge]) -> Result<SpecGraph> {
        // 1. Pass 1: Indexing (slot 0 belongs to the synthetic root)
        for (idx, node) in nodes.iter().enumerate() {
            if node.id == ROOT_NAME {
                bail!("Node ID '{}' is reserved", ROOT_NAME);
            }
            if self.id_map.insert(node.id.clone(), idx + 1).is_some() {
                bail!("Duplicate node ID: {}", node.id);
            }
        }

        // 2. Pass 2: Transform
        let mut specs = Vec::with_capacity(nodes.len() + 1);
        specs.push(TaskSpec::new(ROOT_NAME, TaskKind::Root));
        for node in nodes {
            let spec = self
                .transform_node(id, node, nodes)
                .with_context(|| format!("Invalid node '{}'", node.id))?;
            specs.push(spec);
        }

        // 3. Pass 3: Wiring
        for edge in edges {
            self.wire(&mut specs, nodes, edge)?;
        }
        for (idx, node) in nodes.iter().enumerate() {
            if let NodeType::Boundary { attached_to, .. } = &node.kind {
                let owner = self.resolve_target(attached_to)?;
                specs[owner].boundaries.push(idx + 1);
            }
        }

        // 4. Start Node
        let start_node_id = nodes
            .iter()
            .find(|n| matches!(n.kind, NodeType::Start))
            .map(|n| n.id.as_str())
            .ok_or_else(|| anyhow!("Start node not found"))?;
        let start_index = self.resolve_target(start_node_id)?;

        Ok(SpecGraph::new(id, name, specs, start_index))
    }

    fn wire(&self, specs: &mut [TaskSpec], nodes: &[Node], edge: &Edge) -> Result<()> {
        let source = self
            .id_map
            .get(&edge.source)
            .copied()
            .ok_or_else(|| anyhow!("Source node not found: {}", edge.source))?;
        let target = self.resolve_target(&edge.target)?;

        if matches!(nodes[target - 1].kind, NodeType::Boundary { .. }) {
            bail!("Boundary event '{}' cannot have incoming flows", edge.target);
        }
        if edge.default {
            if edge.condition.is_some() {
                bail!("Default flow {} -> {} cannot have a condition", edge.source, edge.target);
            }
            if specs[source].outgoing.iter().any(|t| t.default) {
                bail!("Node '{}' has more than one default flow", edge.source);
            }
        }

        let guard = edge
            .condition
            .as_deref()
            .map(Expression::compile)
            .transpose()
            .with_context(|| format!("Invalid condition on flow {} -> {}", edge.source, edge.target))?;
        specs[source].outgoing.push(Transition {
            target,
            guard,
            default: edge.default,
        });
        specs[target].incoming.push(source);
        Ok(())
    }

    fn transform_node(&self, graph_id: &str, node: &Node, siblings: &[Node]) -> Result<TaskSpec> {
        let kind = match &node.kind {
            NodeType::Start => TaskKind::StartEvent,
            NodeType::End => TaskKind::EndEvent(EndKind::None),
            NodeType::ErrorEnd { code } => TaskKind::EndEvent(EndKind::Error(code.clone())),
            NodeType::CancelEnd => {
                if !self.in_transaction {
                    bail!("Cancel end event is only allowed inside a transaction");
                }
                TaskKind::EndEvent(EndKind::Cancel)
            }
            NodeType::TerminateEnd => TaskKind::EndEvent(EndKind::Terminate),
            NodeType::Script { script } => TaskKind::ScriptTask(Script::compile(script)?),
            NodeType::User => TaskKind::UserTask,
            NodeType::Manual => TaskKind::ManualTask,
            NodeType::Service { operator, params, result } => {
                let mut compiled = Vec::with_capacity(params.len());
                for (key, value) in params {
                    compiled.push((key.clone(), compile_param(value)?));
                }
                compiled.sort_by(|a, b| a.0.cmp(&b.0));
                TaskKind::ServiceTask {
                    operator: operator.clone(),
                    params: compiled,
                    result: result.clone(),
                }
            }
            NodeType::BusinessRule { decision } => TaskKind::BusinessRuleTask(decision.clone()),
            NodeType::Exclusive => TaskKind::ExclusiveGateway,
            NodeType::Inclusive => TaskKind::InclusiveGateway,
            NodeType::ParallelGateway => TaskKind::ParallelGateway,
            NodeType::CatchEvent { trigger } => TaskKind::IntermediateCatch(Trigger::from(trigger)),
            NodeType::ThrowEvent { trigger } => TaskKind::IntermediateThrow(Trigger::from(trigger)),
            NodeType::Boundary { attached_to, trigger, interrupting } => {
                let owner = self.resolve_target(attached_to)?;
                check_attachment(&siblings[owner - 1], trigger)?;
                TaskKind::BoundaryEvent {
                    attached_to: owner,
                    trigger: Trigger::from(trigger),
                    interrupting: *interrupting,
                }
            }
            NodeType::SubProcess { nodes, edges } => {
                let inner = Compiler::nested(self.in_transaction)
                    .compile_graph(&format!("{}/{}", graph_id, node.id), &node.id, nodes, edges)?;
                TaskKind::SubProcess(Arc::new(inner))
            }
            NodeType::Transaction { nodes, edges } => {
                let inner = Compiler::nested(true)
                    .compile_graph(&format!("{}/{}", graph_id, node.id), &node.id, nodes, edges)?;
                TaskKind::Transaction(Arc::new(inner))
            }
            NodeType::CallActivity { process } => TaskKind::CallActivity(process.clone()),
            NodeType::ParallelBlock { .. } => {
                bail!("Parallel block '{}' should have been expanded", node.id)
            }
        };

        let mut spec = TaskSpec::new(&node.id, kind);
        if let Some(label) = &node.name {
            spec.description = label.clone();
        }
        spec.inputs = node.inputs.clone();
        spec.outputs = node.outputs.clone();
        spec.prescript = node.prescript.as_deref().map(Script::compile).transpose().context("Invalid prescript")?;
        spec.postscript = node.postscript.as_deref().map(Script::compile).transpose().context("Invalid postscript")?;
        spec.loop_characteristics = node.loop_def.as_ref().map(compile_loop).transpose()?;
        Ok(spec)
    }

    fn resolve_target(&self, target_id: &str) -> Result<SpecIndex> {
        self.id_map
            .get(target_id)
            .copied()
            .ok_or_else(|| anyhow!("Target node not found: {}", target_id))
    }
}

/// Boundaries sit on activities; cancel boundaries only on transactions.
fn check_attachment(owner: &Node, trigger: &TriggerDef) -> Result<()> {
    if !owner.kind.is_activity() {
        bail!("Boundary event attached to '{}', which is not an activity", owner.id);
    }
    if matches!(trigger, TriggerDef::Cancel) && !matches!(owner.kind, NodeType::Transaction { .. }) {
        bail!("Cancel boundary attached to '{}', which is not a transaction", owner.id);
    }
    Ok(())
}

fn compile_param(value: &Value) -> Result<ServiceParam> {
    if let Some(source) = value
        .as_str()
        .and_then(|s| s.strip_prefix("${"))
        .and_then(|s| s.strip_suffix('}'))
    {
        return Ok(ServiceParam::Expression(Expression::compile(source)?));
    }
    Ok(ServiceParam::Literal(value.clone()))
}

fn compile_loop(def: &LoopDef) -> Result<LoopCharacteristics> {
    match def {
        LoopDef::Standard { condition, test_before, maximum } => Ok(LoopCharacteristics::Standard {
            condition: Expression::compile(condition).context("Invalid loop condition")?,
            test_before: *test_before,
            maximum: *maximum,
        }),
        LoopDef::Parallel(mi) => compile_multi_instance(mi, false),
        LoopDef::Sequential(mi) => compile_multi_instance(mi, true),
    }
}

fn compile_multi_instance(def: &MultiInstanceDef, sequential: bool) -> Result<LoopCharacteristics> {
    let cardinality = match (&def.collection, &def.cardinality) {
        (Some(collection), _) => Cardinality::Collection(collection.clone()),
        (None, Some(Value::Number(n))) => Cardinality::Fixed(
            n.as_u64()
                .ok_or_else(|| anyhow!("Cardinality must be a non-negative integer, got {}", n))? as usize,
        ),
        (None, Some(Value::String(expr))) => {
            Cardinality::Expression(Expression::compile(expr).context("Invalid cardinality")?)
        }
        (None, Some(other)) => bail!("Unsupported cardinality: {}", other),
        (None, None) => bail!("Multi-instance loop needs a cardinality or a collection"),
    };
    let completion_condition = def
        .completion_condition
        .as_deref()
        .map(Expression::compile)
        .transpose()
        .context("Invalid completion condition")?;

    Ok(LoopCharacteristics::MultiInstance {
        sequential,
        cardinality,
        input_item: def.input_item.clone(),
        output_item: def.output_item.clone(),
        output_collection: def.output_collection.clone(),
        completion_condition,
    })
}
