//! Shared types, errors, and request context for the flowsmith workflow synthesizer.
//!
//! This crate provides the foundational types used across all other flowsmith crates:
//! - `FlowError`: unified error taxonomy
//! - `StepCategory`, `PlannedStep`: the planner's vocabulary
//! - `Graph`: the node/edge shape shared by the assembler, validator, and executor
//! - `Intent`: structured reading of a free-text request
//! - `AgentContext`: per-request decision and repair audit trail

pub mod context;
pub mod graph;
pub mod intent;
pub mod step;

pub use context::{AgentContext, AgentSummary, Decision, RepairRecord};
pub use graph::{Graph, GraphEdge, GraphNode, NodeData, Position, EDGE_TYPE, NODE_TYPE};
pub use intent::{DetectedAction, Intent};
pub use step::{PlannedStep, StepCategory};

/// Unified error type for all flowsmith subsystems.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    // === Registry Errors ===
    #[error("Failed to load capability catalog from {path}: {message}")]
    RegistryLoad { path: String, message: String },

    #[error("Invalid capability catalog: {0}")]
    InvalidCatalog(String),

    // === Graph Errors ===
    #[error("Invalid workflow graph: {0}")]
    InvalidGraph(String),

    #[error("Edge '{edge}' references unknown node '{node}'")]
    DanglingEdge { edge: String, node: String },

    #[error("Workflow contains a cycle or unreachable nodes: {}", .unsorted.join(", "))]
    CycleDetected { unsorted: Vec<String> },

    // === Execution Errors ===
    #[error("Handler '{handler}' failed on node '{node}': {message}")]
    HandlerError {
        handler: String,
        node: String,
        message: String,
    },

    #[error("No handler registered for node '{node}' (step '{step}')")]
    NoHandler { node: String, step: String },

    #[error("Step '{node}' timed out after {timeout_ms}ms")]
    StepTimeout { node: String, timeout_ms: u64 },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl FlowError {
    /// Returns `true` for malformed-graph errors raised before any step runs.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FlowError::InvalidGraph(_)
                | FlowError::DanglingEdge { .. }
                | FlowError::CycleDetected { .. }
        )
    }

    /// Maps the error to an HTTP status code for callers that serve over HTTP.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            FlowError::InvalidGraph(_)
            | FlowError::DanglingEdge { .. }
            | FlowError::CycleDetected { .. }
            | FlowError::Json(_) => Some(400),
            FlowError::StepTimeout { .. } => Some(504),
            FlowError::RegistryLoad { .. } | FlowError::InvalidCatalog(_) => Some(500),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, FlowError>`.
pub type Result<T> = std::result::Result<T, FlowError>;
