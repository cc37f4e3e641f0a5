use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use evalexpr::{
    build_operator_tree, ContextWithMutableFunctions, ContextWithMutableVariables, DefaultNumericTypes,
    EvalexprError, Function, HashMapContext, IterateVariablesContext, Node as EvalNode,
};
use serde_json::{Number, Value};
use crate::error::EngineError;
use crate::runtime::context::Data;

type EvalValue = evalexpr::Value<DefaultNumericTypes>;

/// Host function callable from any expression or script.
pub type ScriptFunction = Arc<dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync>;

/// A guard or condition compiled once into an operator tree.
pub struct Expression {
    source: String,
    tree: EvalNode<DefaultNumericTypes>,
}

impl Expression {
    pub fn compile(source: &str) -> Result<Self, EngineError> {
        let tree = build_operator_tree::<DefaultNumericTypes>(source)
            .map_err(|e| expression_error(source, e))?;
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, data: &Data, scripts: &ScriptEngine) -> Result<Value, EngineError> {
        let ctx = scripts.context(data)?;
        let value = self.tree
            .eval_with_context(&ctx)
            .map_err(|e| expression_error(&self.source, e))?;
        Ok(to_json(&value))
    }

    pub fn evaluate_bool(&self, data: &Data, scripts: &ScriptEngine) -> Result<bool, EngineError> {
        let ctx = scripts.context(data)?;
        self.tree
            .eval_boolean_with_context(&ctx)
            .map_err(|e| expression_error(&self.source, e))
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expression").field(&self.source).finish()
    }
}

/// A statement sequence such as `total = price * quantity; done = true`.
pub struct Script {
    source: String,
    tree: EvalNode<DefaultNumericTypes>,
}

impl Script {
    pub fn compile(source: &str) -> Result<Self, EngineError> {
        let tree = build_operator_tree::<DefaultNumericTypes>(source)
            .map_err(|e| expression_error(source, e))?;
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Runs the script against `data` and returns the variables it created or changed.
    pub fn run(&self, data: &Data, scripts: &ScriptEngine) -> Result<Data, EngineError> {
        let mut ctx = scripts.context(data)?;
        self.tree
            .eval_with_context_mut(&mut ctx)
            .map_err(|e| expression_error(&self.source, e))?;

        let mut writes = Data::new();
        for (name, value) in ctx.iter_variables() {
            let value = to_json(&value);
            if data.get(&name) != Some(&value) {
                writes.insert(name, value);
            }
        }
        Ok(writes)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Script").field(&self.source).finish()
    }
}

/// Builds evaluation contexts: process data plus registered host functions.
#[derive(Clone, Default)]
pub struct ScriptEngine {
    functions: HashMap<String, ScriptFunction>,
}

impl ScriptEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, function: ScriptFunction) {
        self.functions.insert(name.to_string(), function);
    }

    fn context(&self, data: &Data) -> Result<HashMapContext<DefaultNumericTypes>, EngineError> {
        let mut ctx = HashMapContext::<DefaultNumericTypes>::new();
        for (key, value) in data {
            // objects (and arrays holding them) stay invisible to expressions
            if let Some(ev) = to_eval(value) {
                ctx.set_value(key.clone(), ev)
                    .map_err(|e| expression_error(key, e))?;
            }
        }
        for (name, function) in &self.functions {
            let function = Arc::clone(function);
            ctx.set_function(
                name.clone(),
                Function::new(move |argument: &EvalValue| {
                    let args = match argument {
                        EvalValue::Tuple(items) => items.iter().map(to_json).collect(),
                        EvalValue::Empty => Vec::new(),
                        other => vec![to_json(other)],
                    };
                    let result = function(args).map_err(EvalexprError::CustomMessage)?;
                    to_eval(&result).ok_or_else(|| {
                        EvalexprError::CustomMessage("function returned an object".to_string())
                    })
                }),
            )
            .map_err(|e| expression_error(name, e))?;
        }
        Ok(ctx)
    }
}

impl fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("ScriptEngine").field("functions", &names).finish()
    }
}

fn expression_error(source: &str, err: impl fmt::Display) -> EngineError {
    EngineError::Expression {
        expression: source.to_string(),
        message: err.to_string(),
    }
}

/// Nulls and objects have no evalexpr counterpart and are skipped.
pub fn to_eval(value: &Value) -> Option<EvalValue> {
    match value {
        Value::Null | Value::Object(_) => None,
        Value::Bool(b) => Some(EvalValue::Boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(EvalValue::Int(i))
            } else {
                n.as_f64().map(EvalValue::Float)
            }
        }
        Value::String(s) => Some(EvalValue::String(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(to_eval)
            .collect::<Option<Vec<_>>>()
            .map(EvalValue::Tuple),
    }
}

pub fn to_json(value: &EvalValue) -> Value {
    match value {
        EvalValue::String(s) => Value::String(s.clone()),
        EvalValue::Int(i) => Value::from(*i),
        EvalValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        EvalValue::Boolean(b) => Value::Bool(*b),
        EvalValue::Tuple(items) => Value::Array(items.iter().map(to_json).collect()),
        EvalValue::Empty => Value::Null,
    }
}
