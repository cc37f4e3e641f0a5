use serde_json::{Map, Value};
use tracing::debug;
use crate::error::{BpmnError, EngineError};
use crate::runtime::blueprint::ServiceParam;
use crate::runtime::context::Context;
use crate::runtime::expression::Script;
use crate::runtime::syscall::Syscall;

pub fn script(ctx: &mut Context, script: &Script, syscall: &mut dyn Syscall) -> Result<(), EngineError> {
    ctx.run_script(script)?;
    syscall.proceed();
    Ok(())
}

/// User and manual tasks: the caller's data has already been merged into `ctx`.
pub fn human(syscall: &mut dyn Syscall) -> Result<(), EngineError> {
    syscall.proceed();
    Ok(())
}

pub fn container(syscall: &mut dyn Syscall) -> Result<(), EngineError> {
    syscall.enter();
    Ok(())
}

/// 将 ServiceHandler 包装为任务行为
pub fn service(
    ctx: &mut Context,
    operator: &str,
    params: &[(String, ServiceParam)],
    result: Option<&str>,
    syscall: &mut dyn Syscall,
) -> Result<(), EngineError> {
    let handler = ctx
        .engine
        .service(operator)
        .ok_or_else(|| EngineError::ServiceNotFound(operator.to_string()))?;

    // 1. Resolve params
    let mut resolved = Map::new();
    for (key, param) in params {
        let value = match param {
            ServiceParam::Literal(v) => v.clone(),
            ServiceParam::Expression(expr) => ctx.evaluate(expr)?,
        };
        resolved.insert(key.clone(), value);
    }
    let resolved = Value::Object(resolved);

    // 2. Execute
    let output = handler
        .validate(&resolved)
        .and_then(|_| handler.execute(resolved, ctx))
        .map_err(|err| service_error(operator, err))?;
    debug!(task = %ctx.spec().name, operator, "Service returned");

    // 3. Write result
    if let Some(var) = result {
        ctx.set_var(var, output);
    }
    syscall.proceed();
    Ok(())
}

fn service_error(operator: &str, err: anyhow::Error) -> EngineError {
    match err.downcast_ref::<BpmnError>() {
        Some(bpmn) => EngineError::Service {
            name: operator.to_string(),
            code: Some(bpmn.code.clone()),
            message: bpmn.message.clone(),
        },
        None => EngineError::Service {
            name: operator.to_string(),
            code: None,
            message: format!("{:#}", err),
        },
    }
}

pub fn business_rule(ctx: &mut Context, decision: &str, syscall: &mut dyn Syscall) -> Result<(), EngineError> {
    let table = ctx
        .engine
        .decision(decision)
        .ok_or_else(|| EngineError::DecisionNotFound(decision.to_string()))?;

    let output = table.evaluate(ctx.data()).map_err(|err| EngineError::Data {
        task: ctx.spec().name.clone(),
        message: format!("decision '{}' failed: {:#}", decision, err),
    })?;
    ctx.extend(output);
    syscall.proceed();
    Ok(())
}
