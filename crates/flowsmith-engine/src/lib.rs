//! Workflow execution engine and step handlers.
//!
//! This crate runs workflow graphs: structural validation, Kahn topological
//! ordering, sequential fail-fast execution with per-node deadlines, and run
//! events for observers.

pub mod context;
pub mod engine;
pub mod events;
pub mod handler;
pub mod result;
pub mod topo;

pub use context::RunContext;
pub use engine::{progress, validate_structure, ExecutorConfig, WorkflowExecutor, DEFAULT_NODE_TIMEOUT};
pub use events::{EventEmitter, RunEvent};
pub use handler::{default_registry, DynHandler, HandlerRegistry, RecordingHandler, StepHandler, StepOutcome};
pub use result::{ExecutionResult, LogEntry, RunStatus, StepStatus};
pub use topo::{topological_sort, TopoOrder};
