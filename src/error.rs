use thiserror::Error;
use crate::runtime::signal::Signal;
use crate::runtime::task::{TaskId, TaskState};

/// 引擎运行时错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// An exclusive/inclusive split found no true guard and has no default flow
    #[error("no outgoing flow of '{task}' matched and no default flow is declared")]
    NoMatchingFlow { task: String },

    #[error("loop '{task}' reached its maximum of {maximum} iterations without exiting")]
    LoopBoundsExceeded { task: String, maximum: usize },

    #[error("task {task} is {state}, expected READY")]
    InvalidState { task: TaskId, state: TaskState },

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("unhandled signal {signal} raised at '{task}'")]
    UnhandledSignal { task: String, signal: Signal },

    #[error("expression `{expression}` failed: {message}")]
    Expression { expression: String, message: String },

    #[error("data error in '{task}': {message}")]
    Data { task: String, message: String },

    #[error("process not registered: {0}")]
    ProcessNotFound(String),

    #[error("service not registered: {0}")]
    ServiceNotFound(String),

    #[error("decision not registered: {0}")]
    DecisionNotFound(String),

    #[error("service '{name}' failed: {message}")]
    Service { name: String, code: Option<String>, message: String },

    #[error("step limit of {0} exceeded in a single advance")]
    StepLimitExceeded(usize),

    #[error("signal {0} needs a target task")]
    MissingSignalTarget(String),
}

impl EngineError {
    /// Stable code used when the error travels as an error signal.
    pub fn code(&self) -> &str {
        match self {
            EngineError::NoMatchingFlow { .. } => "NoMatchingFlow",
            EngineError::LoopBoundsExceeded { .. } => "LoopBoundsExceeded",
            EngineError::InvalidState { .. } => "InvalidState",
            EngineError::UnknownTask(_) => "UnknownTask",
            EngineError::UnhandledSignal { .. } => "UnhandledSignal",
            EngineError::Expression { .. } => "ExpressionError",
            EngineError::Data { .. } => "DataError",
            EngineError::ProcessNotFound(_) => "ProcessNotFound",
            EngineError::ServiceNotFound(_) => "ServiceNotFound",
            EngineError::DecisionNotFound(_) => "DecisionNotFound",
            // business errors keep the code the handler chose
            EngineError::Service { code: Some(code), .. } => code.as_str(),
            EngineError::Service { code: None, .. } => "ServiceError",
            EngineError::StepLimitExceeded(_) => "StepLimitExceeded",
            EngineError::MissingSignalTarget(_) => "MissingSignalTarget",
        }
    }
}

/// Business error a service handler can return (wrapped in `anyhow::Error`);
/// the engine turns it into a coded error signal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("business error {code}: {message}")]
pub struct BpmnError {
    pub code: String,
    pub message: String,
}

impl BpmnError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
