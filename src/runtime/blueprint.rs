use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use serde_json::Value;
use crate::runtime::expression::{Expression, Script};
use crate::runtime::signal::Trigger;

pub type SpecIndex = usize;

/// 编译后的流程图 (不可变，由所有实例共享)
#[derive(Debug)]
pub struct SpecGraph {
    pub id: String,
    pub name: String,
    /// Index 0 is always the synthetic `Root` spec
    pub specs: Vec<TaskSpec>,
    pub start: SpecIndex,
    pub variables: HashMap<String, Value>,
    pub data_inputs: Vec<String>,
    pub data_outputs: Vec<String>,
    index: HashMap<String, SpecIndex>,
}

impl SpecGraph {
    pub const ROOT: SpecIndex = 0;

    pub fn new(id: &str, name: &str, specs: Vec<TaskSpec>, start: SpecIndex) -> Self {
        let index = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.clone(), i))
            .collect();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            specs,
            start,
            variables: HashMap::new(),
            data_inputs: Vec::new(),
            data_outputs: Vec::new(),
            index,
        }
    }

    pub fn spec(&self, index: SpecIndex) -> &TaskSpec {
        &self.specs[index]
    }

    pub fn lookup(&self, name: &str) -> Option<SpecIndex> {
        self.index.get(name).copied()
    }

    /// Whether a token at `from` can still travel to `to` along sequence flows
    /// (or boundary events of the activities on the way).
    pub fn can_reach(&self, from: SpecIndex, to: SpecIndex) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            let spec = self.spec(current);
            queue.extend(spec.outgoing.iter().map(|t| t.target));
            queue.extend(spec.boundaries.iter().copied());
        }
        false
    }
}

/// 蓝图节点 (图中的一个节点及其类型化配置)
#[derive(Debug)]
pub struct TaskSpec {
    pub name: String,
    pub description: String,
    pub kind: TaskKind,
    pub outgoing: Vec<Transition>,
    pub incoming: Vec<SpecIndex>,
    pub boundaries: Vec<SpecIndex>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub prescript: Option<Script>,
    pub postscript: Option<Script>,
    pub loop_characteristics: Option<LoopCharacteristics>,
}

impl TaskSpec {
    pub fn new(name: &str, kind: TaskKind) -> Self {
        Self {
            name: name.to_string(),
            description: name.to_string(),
            kind,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            boundaries: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            prescript: None,
            postscript: None,
            loop_characteristics: None,
        }
    }

    /// A parallel or inclusive gateway merging more than one incoming flow.
    pub fn is_join(&self) -> bool {
        matches!(self.kind, TaskKind::ParallelGateway | TaskKind::InclusiveGateway)
            && self.incoming.len() > 1
    }

    /// Completes only through `ProcessInstance::complete`.
    pub fn is_human(&self) -> bool {
        matches!(self.kind, TaskKind::UserTask | TaskKind::ManualTask)
    }

    pub fn is_container(&self) -> bool {
        matches!(
            self.kind,
            TaskKind::SubProcess(_) | TaskKind::Transaction(_) | TaskKind::CallActivity(_)
        )
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            TaskKind::Root => "root",
            TaskKind::StartEvent => "start_event",
            TaskKind::EndEvent(_) => "end_event",
            TaskKind::IntermediateCatch(_) => "intermediate_catch_event",
            TaskKind::IntermediateThrow(_) => "intermediate_throw_event",
            TaskKind::BoundaryEvent { .. } => "boundary_event",
            TaskKind::ScriptTask(_) => "script_task",
            TaskKind::UserTask => "user_task",
            TaskKind::ManualTask => "manual_task",
            TaskKind::ServiceTask { .. } => "service_task",
            TaskKind::BusinessRuleTask(_) => "business_rule_task",
            TaskKind::ExclusiveGateway => "exclusive_gateway",
            TaskKind::InclusiveGateway => "inclusive_gateway",
            TaskKind::ParallelGateway => "parallel_gateway",
            TaskKind::SubProcess(_) => "subprocess",
            TaskKind::Transaction(_) => "transaction",
            TaskKind::CallActivity(_) => "call_activity",
        }
    }
}

#[derive(Debug)]
pub struct Transition {
    pub target: SpecIndex,
    pub guard: Option<Expression>,
    pub default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndKind {
    None,
    Error(Option<String>),
    Cancel,
    Terminate,
}

#[derive(Debug)]
pub enum ServiceParam {
    Literal(Value),
    /// `"${expr}"` in the definition
    Expression(Expression),
}

#[derive(Debug)]
pub enum TaskKind {
    Root,
    StartEvent,
    EndEvent(EndKind),
    IntermediateCatch(Trigger),
    IntermediateThrow(Trigger),
    BoundaryEvent {
        attached_to: SpecIndex,
        trigger: Trigger,
        interrupting: bool,
    },
    ScriptTask(Script),
    UserTask,
    ManualTask,
    ServiceTask {
        operator: String,
        params: Vec<(String, ServiceParam)>,
        result: Option<String>,
    },
    BusinessRuleTask(String),
    ExclusiveGateway,
    InclusiveGateway,
    ParallelGateway,
    SubProcess(Arc<SpecGraph>),
    Transaction(Arc<SpecGraph>),
    /// Key of a process registered with the engine
    CallActivity(String),
}

#[derive(Debug)]
pub enum Cardinality {
    Fixed(usize),
    Expression(Expression),
    /// Name of an array variable; one instance per element
    Collection(String),
}

#[derive(Debug)]
pub enum LoopCharacteristics {
    Standard {
        condition: Expression,
        test_before: bool,
        maximum: Option<usize>,
    },
    MultiInstance {
        sequential: bool,
        cardinality: Cardinality,
        input_item: Option<String>,
        output_item: Option<String>,
        output_collection: Option<String>,
        completion_condition: Option<Expression>,
    },
}
