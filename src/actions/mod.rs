use serde_json::Value;
use crate::runtime::context::{Context, Data};
use anyhow::Result;
use std::fmt::Debug;

pub mod builtin;

/// 插件接口：服务任务通过 operator 名称调用此 Trait
///
/// Return a [`crate::BpmnError`] (inside the `anyhow::Error`) to raise a coded
/// error that boundary events can catch; any other error is raised without a code.
pub trait ServiceHandler: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn validate(&self, _params: &Value) -> Result<()> {
        Ok(())
    }

    fn execute(&self, params: Value, ctx: &Context) -> Result<Value>;
}

/// The decision/rule collaborator behind business rule tasks: takes the data
/// visible to the task and returns the variables to set.
pub trait DecisionTable: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn evaluate(&self, input: &Data) -> Result<Data>;
}
