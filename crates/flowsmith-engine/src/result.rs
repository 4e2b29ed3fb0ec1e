//! Run results and per-node log entries.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every node ran and succeeded.
    Success,
    /// A node failed; later nodes were not run.
    Failed,
    /// The graph was rejected before any node ran.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub node_id: String,
    /// Catalog step id, or the node `type` when the node carries none.
    #[serde(rename = "type")]
    pub step_type: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl LogEntry {
    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub run_id: String,
    pub status: RunStatus,
    /// The full topological order, including nodes never reached.
    pub execution_order: Vec<String>,
    pub outputs: HashMap<String, Value>,
    pub logs: Vec<LogEntry>,
    /// Wall-clock milliseconds for the whole run.
    pub execution_time: u64,
    pub failed_node: Option<String>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Result for a graph rejected before anything ran.
    pub fn rejected(run_id: impl Into<String>, error: impl Into<String>, execution_time: u64) -> Self {
        Self {
            success: false,
            run_id: run_id.into(),
            status: RunStatus::Error,
            execution_order: Vec::new(),
            outputs: HashMap::new(),
            logs: Vec::new(),
            execution_time,
            failed_node: None,
            completed_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn log_for(&self, node_id: &str) -> Option<&LogEntry> {
        self.logs.iter().find(|l| l.node_id == node_id)
    }
}
