use serde_json::Value;
use crate::actions::ServiceHandler;
use crate::runtime::context::Context;
use anyhow::{Result, anyhow};
use tracing::info;

#[derive(Debug)]
pub struct LogService;

impl ServiceHandler for LogService {
    fn name(&self) -> &str {
        "log"
    }

    fn execute(&self, params: Value, ctx: &Context) -> Result<Value> {
        let task = &ctx.spec().name;
        if let Some(msg) = params.get("msg").and_then(|v| v.as_str()) {
            info!(task = %task, "[LOG] {}", msg);
        } else {
            info!(task = %task, "[LOG] {}", params);
        }
        Ok(Value::Null)
    }
}

/// Returns its `value` parameter unchanged.
#[derive(Debug)]
pub struct EchoService;

impl ServiceHandler for EchoService {
    fn name(&self) -> &str {
        "echo"
    }

    fn validate(&self, params: &Value) -> Result<()> {
        if params.get("value").is_none() {
            return Err(anyhow!("echo requires a 'value' parameter"));
        }
        Ok(())
    }

    fn execute(&self, params: Value, _ctx: &Context) -> Result<Value> {
        Ok(params.get("value").cloned().unwrap_or(Value::Null))
    }
}
