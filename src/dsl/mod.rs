pub mod builder;

use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use serde_json::Value;

/// 原始 DSL 定义的流程
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Process {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    /// Names a call activity must supply when it calls this process
    #[serde(default)]
    pub data_inputs: Vec<String>,
    /// Names copied back to the caller when this process completes
    #[serde(default)]
    pub data_outputs: Vec<String>,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// DSL 中的节点类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum NodeType {
    Start,
    End,
    ErrorEnd {
        #[serde(default)]
        code: Option<String>,
    },
    CancelEnd,
    TerminateEnd,

    Script {
        script: String,
    },
    User,
    Manual,
    Service {
        operator: String,
        #[serde(default)]
        params: HashMap<String, Value>,
        #[serde(default)]
        result: Option<String>,
    },
    BusinessRule {
        decision: String,
    },

    Exclusive,
    Inclusive,
    ParallelGateway,

    CatchEvent {
        trigger: TriggerDef,
    },
    ThrowEvent {
        trigger: TriggerDef,
    },
    Boundary {
        attached_to: String,
        trigger: TriggerDef,
        #[serde(default = "default_interrupting")]
        interrupting: bool,
    },

    SubProcess {
        nodes: Vec<Node>,
        #[serde(default)]
        edges: Vec<Edge>,
    },
    Transaction {
        nodes: Vec<Node>,
        #[serde(default)]
        edges: Vec<Edge>,
    },
    CallActivity {
        process: String,
    },

    /// 并行块语法糖 (由 Expander 展开为 ParallelGateway split/join)
    ParallelBlock {
        branches: Vec<Branch>,
    },
}

fn default_interrupting() -> bool {
    true
}

impl NodeType {
    pub fn is_activity(&self) -> bool {
        matches!(
            self,
            NodeType::Script { .. }
                | NodeType::User
                | NodeType::Manual
                | NodeType::Service { .. }
                | NodeType::BusinessRule { .. }
                | NodeType::SubProcess { .. }
                | NodeType::Transaction { .. }
                | NodeType::CallActivity { .. }
        )
    }
}

/// What a catching event or boundary listens for, or what a throw event emits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerDef {
    Error {
        #[serde(default)]
        code: Option<String>,
    },
    Cancel,
    Timer {
        timer: String,
    },
    Message {
        name: String,
    },
    Signal {
        name: String,
    },
}

/// Loop / multi-instance marker on an activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LoopDef {
    Standard {
        condition: String,
        #[serde(default)]
        test_before: bool,
        #[serde(default)]
        maximum: Option<usize>,
    },
    Parallel(MultiInstanceDef),
    Sequential(MultiInstanceDef),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MultiInstanceDef {
    /// Fixed count or an expression evaluating to an integer
    #[serde(default)]
    pub cardinality: Option<Value>,
    /// Name of the array variable to iterate
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub input_item: Option<String>,
    #[serde(default)]
    pub output_item: Option<String>,
    #[serde(default)]
    pub output_collection: Option<String>,
    #[serde(default)]
    pub completion_condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    /// 分支内节点按顺序线性连接
    pub nodes: Vec<Node>,
}

/// DSL 中的节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    /// Human readable label, shown in navigation
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: NodeType,
    #[serde(default)]
    pub prescript: Option<String>,
    #[serde(default)]
    pub postscript: Option<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, rename = "loop")]
    pub loop_def: Option<LoopDef>,
}

impl Node {
    pub fn new(id: &str, kind: NodeType) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            kind,
            prescript: None,
            postscript: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            loop_def: None,
        }
    }
}

/// DSL 中的边
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub default: bool,
}

impl Edge {
    pub fn new(source: &str, target: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            condition: None,
            default: false,
        }
    }
}
