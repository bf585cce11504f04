//! Task planning and execution.
//!
//! A task invocation resolves its fields, expands its matrix, and emits an
//! ordered list of [`ExecSpec`] subprocess intents per matrix entry. The
//! [`runner`] drives them through the before/after/matrix hook state machine
//! with structured cancellation; the [`executor`] spawns the processes and
//! maintains the replace table.

pub mod aggregate;
pub mod kinds;

mod action;
mod context;
mod error;
mod executor;
mod hooks;
mod reference;
mod runner;
mod spec;
mod task;
mod tool;

pub use action::Action;
pub use context::{RunState, TaskContext};
pub use error::ExecError;
pub use executor::execute_specs;
pub use hooks::{HookPoint, Hooks};
pub use reference::TaskReference;
pub use runner::run_task;
pub use spec::{AlterExec, ExecSpec, MatrixExecOptions, PlanStep, ReplaceTable, StdoutFixup, TaskPlan};
pub use task::{task_identity, EnvEntry, Task, TaskCommon, TaskDoc};
pub use tool::{Tool, ToolKey};
