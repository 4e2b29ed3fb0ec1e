//! Run event system for observability.
//!
//! Emits [`RunEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! observers (loggers, progress bars, UIs) can follow a run without coupling
//! to the executor.

use serde::{Deserialize, Serialize};

/// Events emitted during a workflow run.
///
/// Serialized with an `event` tag holding [`RunEvent::name`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        node_count: usize,
    },
    RunCompleted {
        run_id: String,
        executed: Vec<String>,
        duration_ms: u64,
    },
    RunFailed {
        run_id: String,
        failed_node: Option<String>,
        error: String,
    },
    StepStarted {
        node_id: String,
        handler_type: String,
    },
    StepCompleted {
        node_id: String,
        duration_ms: u64,
    },
    StepFailed {
        node_id: String,
        error: String,
    },
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunFailed { .. } => "run_failed",
            Self::StepStarted { .. } => "step_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::StepFailed { .. } => "step_failed",
        }
    }

    /// The run this event belongs to. Step events carry only a node id.
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. } => Some(run_id),
            Self::StepStarted { .. } | Self::StepCompleted { .. } | Self::StepFailed { .. } => {
                None
            }
        }
    }

    /// `true` for the events that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted { .. } | Self::RunFailed { .. })
    }
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
