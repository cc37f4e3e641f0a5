pub mod context;
pub mod blueprint;
pub mod expression;
pub mod signal;
pub mod task;
pub mod tree;
pub mod engine;
pub mod instance;
pub mod syscall;
pub mod router;
pub mod subprocess;
pub mod multi_instance;
pub mod navigation;
