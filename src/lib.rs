pub mod actions;
pub mod compiler;
pub mod config;
pub mod dsl;
pub mod error;
pub mod nodes;
pub mod runtime;

pub use config::EngineConfig;
pub use error::{BpmnError, EngineError};
pub use runtime::engine::Engine;
pub use runtime::instance::ProcessInstance;
pub use runtime::navigation::NavItem;
pub use runtime::signal::Signal;
pub use runtime::task::{Task, TaskId, TaskState};
