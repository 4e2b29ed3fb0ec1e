//! Workflow execution engine: the sequential, fail-fast run loop.
//!
//! A run has four phases: structural validation, topological ordering,
//! execution in that order, and finalization into an [`ExecutionResult`].

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::Value;

use flowsmith_types::{FlowError, Graph, GraphNode, Result};

use crate::context::RunContext;
use crate::events::{EventEmitter, RunEvent};
use crate::handler::{default_registry, HandlerRegistry, StepOutcome};
use crate::result::{ExecutionResult, LogEntry, RunStatus, StepStatus};
use crate::topo::topological_sort;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(300);

/// Configuration for workflow runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Deadline for a single handler call. `None` waits indefinitely.
    pub node_timeout: Option<Duration>,
}

impl ExecutorConfig {
    pub fn unbounded() -> Self {
        Self { node_timeout: None }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            node_timeout: Some(DEFAULT_NODE_TIMEOUT),
        }
    }
}

/// Runs workflow graphs against a handler registry.
pub struct WorkflowExecutor {
    registry: HandlerRegistry,
    config: ExecutorConfig,
    events: Option<EventEmitter>,
}

// ---------------------------------------------------------------------------
// Structural checks
// ---------------------------------------------------------------------------

/// Reject graphs the executor cannot run: empty or duplicate node ids, nodes
/// without a type, and edges whose endpoints are missing or unknown.
pub fn validate_structure(graph: &Graph) -> Result<()> {
    let mut ids = HashSet::with_capacity(graph.nodes.len());
    for (i, node) in graph.nodes.iter().enumerate() {
        if node.id.is_empty() {
            return Err(FlowError::InvalidGraph(format!(
                "node at index {i} has an empty id"
            )));
        }
        if node.node_type.is_empty() {
            return Err(FlowError::InvalidGraph(format!(
                "node '{}' has an empty type",
                node.id
            )));
        }
        if !ids.insert(node.id.as_str()) {
            return Err(FlowError::InvalidGraph(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
    }

    for edge in &graph.edges {
        if edge.source.is_empty() || edge.target.is_empty() {
            return Err(FlowError::InvalidGraph(format!(
                "edge '{}' is missing a source or target",
                edge.id
            )));
        }
        for endpoint in [&edge.source, &edge.target] {
            if !ids.contains(endpoint.as_str()) {
                return Err(FlowError::DanglingEdge {
                    edge: edge.id.clone(),
                    node: endpoint.clone(),
                });
            }
        }
    }
    Ok(())
}

fn step_type(node: &GraphNode) -> String {
    if node.data.node_id.is_empty() {
        node.node_type.clone()
    } else {
        node.data.node_id.clone()
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

impl WorkflowExecutor {
    /// Create an executor with the given handler registry.
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            config: ExecutorConfig::default(),
            events: None,
        }
    }

    /// Create an executor pre-loaded with the dry-run handlers.
    pub fn with_default_registry() -> Self {
        Self::new(default_registry())
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    /// Run `graph` to completion or first failure.
    ///
    /// Structural problems (see [`validate_structure`]) and cycles are
    /// returned as `Err` before any handler runs. Everything that goes wrong
    /// inside a step becomes a failed [`LogEntry`] instead.
    pub async fn run(&self, graph: &Graph, ctx: &RunContext) -> Result<ExecutionResult> {
        let started = Instant::now();

        // Phase 1: Validate
        validate_structure(graph)?;

        // Phase 2: Order
        let topo = topological_sort(graph);
        if topo.has_cycle {
            return Err(FlowError::CycleDetected {
                unsorted: topo.unsorted(graph),
            });
        }

        let run_id = ctx.run_id().to_string();
        tracing::info!(run_id = %run_id, nodes = graph.nodes.len(), "Workflow run started");
        self.emit(RunEvent::RunStarted {
            run_id: run_id.clone(),
            node_count: graph.nodes.len(),
        });

        // Phase 3: Execute
        let mut outputs: HashMap<String, Value> = HashMap::new();
        let mut logs: Vec<LogEntry> = Vec::with_capacity(topo.order.len());
        let mut failed: Option<(String, String)> = None;

        for id in &topo.order {
            let node = graph
                .node(id)
                .ok_or_else(|| FlowError::InvalidGraph(format!("node '{id}' vanished from graph")))?;

            let step_started = Instant::now();
            let result = self.execute_step(node, &outputs, ctx).await;
            let duration_ms = step_started.elapsed().as_millis() as u64;

            let (outcome, error) = match result {
                Ok(outcome) if outcome.success => (outcome, None),
                Ok(outcome) => {
                    let error = outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "Step reported failure".to_string());
                    (outcome, Some(error))
                }
                Err(e) => (StepOutcome::default(), Some(e.to_string())),
            };

            let entry = LogEntry {
                node_id: id.clone(),
                step_type: step_type(node),
                status: if error.is_none() {
                    StepStatus::Success
                } else {
                    StepStatus::Failed
                },
                error: error.clone(),
                timestamp: chrono::Utc::now(),
                duration_ms,
                details: outcome.details,
            };
            logs.push(entry);

            match error {
                None => {
                    tracing::debug!(run_id = %run_id, node = %id, duration_ms, "Step completed");
                    outputs.insert(id.clone(), outcome.output.unwrap_or(Value::Null));
                    self.emit(RunEvent::StepCompleted {
                        node_id: id.clone(),
                        duration_ms,
                    });
                }
                Some(error) => {
                    tracing::warn!(run_id = %run_id, node = %id, error = %error, "Step failed; stopping run");
                    outputs.insert(id.clone(), Value::Null);
                    self.emit(RunEvent::StepFailed {
                        node_id: id.clone(),
                        error: error.clone(),
                    });
                    failed = Some((id.clone(), error));
                    break;
                }
            }
        }

        // Phase 4: Finalize
        let execution_time = started.elapsed().as_millis() as u64;
        let (status, failed_node) = match failed {
            None => {
                tracing::info!(run_id = %run_id, executed = logs.len(), execution_time, "Workflow run succeeded");
                self.emit(RunEvent::RunCompleted {
                    run_id: run_id.clone(),
                    executed: logs.iter().map(|l| l.node_id.clone()).collect(),
                    duration_ms: execution_time,
                });
                (RunStatus::Success, None)
            }
            Some((node, error)) => {
                tracing::warn!(run_id = %run_id, failed_node = %node, execution_time, "Workflow run failed");
                self.emit(RunEvent::RunFailed {
                    run_id: run_id.clone(),
                    failed_node: Some(node.clone()),
                    error,
                });
                (RunStatus::Failed, Some(node))
            }
        };

        Ok(ExecutionResult {
            success: status == RunStatus::Success,
            run_id,
            status,
            execution_order: topo.order,
            outputs,
            logs,
            execution_time,
            failed_node,
            completed_at: chrono::Utc::now(),
            error: None,
        })
    }

    /// Like [`run`](Self::run), but folds structural errors into a result
    /// with status `error`.
    pub async fn run_workflow(&self, graph: &Graph, ctx: &RunContext) -> ExecutionResult {
        let started = Instant::now();
        match self.run(graph, ctx).await {
            Ok(result) => result,
            Err(e) => self.rejected(ctx, e, started),
        }
    }

    /// Run a raw JSON graph, rejecting it with status `error` when it does
    /// not have the `nodes`/`edges` shape.
    pub async fn run_value(&self, value: Value, ctx: &RunContext) -> ExecutionResult {
        let started = Instant::now();
        match Graph::from_value(value) {
            Ok(graph) => self.run_workflow(&graph, ctx).await,
            Err(e) => self.rejected(ctx, e, started),
        }
    }

    fn rejected(&self, ctx: &RunContext, error: FlowError, started: Instant) -> ExecutionResult {
        tracing::warn!(run_id = %ctx.run_id(), error = %error, "Workflow rejected before execution");
        self.emit(RunEvent::RunFailed {
            run_id: ctx.run_id().to_string(),
            failed_node: None,
            error: error.to_string(),
        });
        ExecutionResult::rejected(
            ctx.run_id(),
            error.to_string(),
            started.elapsed().as_millis() as u64,
        )
    }

    async fn execute_step(
        &self,
        node: &GraphNode,
        outputs: &HashMap<String, Value>,
        ctx: &RunContext,
    ) -> Result<StepOutcome> {
        let Some(handler) = self.registry.resolve(node) else {
            return Err(FlowError::NoHandler {
                node: node.id.clone(),
                step: step_type(node),
            });
        };

        tracing::debug!(node = %node.id, handler = handler.handler_type(), "Executing step");
        self.emit(RunEvent::StepStarted {
            node_id: node.id.clone(),
            handler_type: handler.handler_type().to_string(),
        });

        let call = AssertUnwindSafe(handler.handle(node, outputs, ctx)).catch_unwind();
        let caught = match self.config.node_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(caught) => caught,
                Err(_) => {
                    return Err(FlowError::StepTimeout {
                        node: node.id.clone(),
                        timeout_ms: limit.as_millis() as u64,
                    })
                }
            },
            None => call.await,
        };

        caught.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            tracing::error!(node = %node.id, handler = handler.handler_type(), panic = %message, "Handler panicked");
            Err(FlowError::HandlerError {
                handler: handler.handler_type().to_string(),
                node: node.id.clone(),
                message: format!("handler panicked: {message}"),
            })
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Summary of a finished run for display: `(executed, total)`.
pub fn progress(result: &ExecutionResult) -> (usize, usize) {
    (result.logs.len(), result.execution_order.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
