use std::collections::HashMap;
use serde_json::Value;
use uuid::Uuid;
use crate::runtime::blueprint::TaskSpec;
use crate::runtime::engine::Engine;
use crate::runtime::expression::{Expression, Script};
use crate::runtime::signal::Signal;
use crate::runtime::task::Task;
use crate::error::EngineError;

pub type Data = HashMap<String, Value>;

/// 运行时上下文 (Runtime Context)
/// A snapshot of the data visible to one task while it executes. Writes are
/// buffered and only reach the task's scope once its behaviour succeeded.
pub struct Context<'a> {
    pub instance_id: Uuid,
    pub task: &'a Task,
    pub engine: &'a Engine,
    data: Data,
    writes: Data,
}

impl<'a> Context<'a> {
    pub fn new(instance_id: Uuid, task: &'a Task, engine: &'a Engine, data: Data) -> Self {
        Self {
            instance_id,
            task,
            engine,
            data,
            writes: Data::new(),
        }
    }

    pub fn spec(&self) -> &'a TaskSpec {
        self.task.spec()
    }

    pub fn fired(&self) -> Option<&'a Signal> {
        self.task.fired()
    }

    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set_var(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value.clone());
        self.writes.insert(key.to_string(), value);
    }

    pub fn extend(&mut self, vars: Data) {
        for (key, value) in vars {
            self.set_var(&key, value);
        }
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn evaluate(&self, expr: &Expression) -> Result<Value, EngineError> {
        expr.evaluate(&self.data, self.engine.scripts())
    }

    pub fn evaluate_bool(&self, expr: &Expression) -> Result<bool, EngineError> {
        expr.evaluate_bool(&self.data, self.engine.scripts())
    }

    pub fn run_script(&mut self, script: &Script) -> Result<(), EngineError> {
        let writes = script.run(&self.data, self.engine.scripts())?;
        self.extend(writes);
        Ok(())
    }

    pub fn into_writes(self) -> Data {
        self.writes
    }
}
