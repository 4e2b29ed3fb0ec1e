//! End-to-end integration tests for the flowsmith pipeline.
//!
//! Each test exercises the full path: prompt -> synthesize -> validate -> execute -> verify.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use flowsmith_engine::{
    default_registry, topological_sort, EventEmitter, ExecutorConfig, RunContext, RunEvent,
    RunStatus, StepHandler, StepOutcome, StepStatus, WorkflowExecutor,
};
use flowsmith_planner::{synthesize, validate_and_repair, validate_workflow};
use flowsmith_registry::CapabilityRegistry;
use flowsmith_types::{AgentContext, FlowError, Graph, GraphNode, Result, StepCategory};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn registry() -> CapabilityRegistry {
    CapabilityRegistry::builtin().expect("builtin catalog should load")
}

fn executor() -> WorkflowExecutor {
    WorkflowExecutor::with_default_registry()
}

/// Counts calls and fails on one chosen step id.
struct FailOn {
    step: &'static str,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl StepHandler for FailOn {
    fn handler_type(&self) -> &str {
        self.step
    }

    async fn handle(
        &self,
        _node: &GraphNode,
        _outputs: &HashMap<String, Value>,
        _ctx: &RunContext,
    ) -> Result<StepOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StepOutcome::failure("SMTP server unreachable"))
    }
}

struct Hangs;

#[async_trait]
impl StepHandler for Hangs {
    fn handler_type(&self) -> &str {
        "process"
    }

    async fn handle(
        &self,
        _node: &GraphNode,
        _outputs: &HashMap<String, Value>,
        _ctx: &RunContext,
    ) -> Result<StepOutcome> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(StepOutcome::success(Value::Null))
    }
}

/// Reads an upstream output that was never produced.
struct PanicsOnMissingInput;

#[async_trait]
impl StepHandler for PanicsOnMissingInput {
    fn handler_type(&self) -> &str {
        "process"
    }

    async fn handle(
        &self,
        _node: &GraphNode,
        outputs: &HashMap<String, Value>,
        _ctx: &RunContext,
    ) -> Result<StepOutcome> {
        let items = &outputs["missing"];
        Ok(StepOutcome::success(items.clone()))
    }
}

// ---------------------------------------------------------------------------
// Test 1: Prompt to successful dry run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prompt_synthesizes_and_runs_to_completion() {
    let synthesis = synthesize(
        "Fetch blogs, summarize them, and email me",
        &registry(),
    );
    assert!(synthesis.valid, "issues: {:?}", synthesis.issues);

    let graph = synthesis.workflow;
    let result = executor()
        .run(&graph, &RunContext::new())
        .await
        .expect("synthesized graph should be runnable");

    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.execution_order.len(), graph.nodes.len());
    assert_eq!(result.logs.len(), graph.nodes.len());

    // Each node saw every earlier node's output.
    let last = graph.nodes.last().unwrap();
    let upstream = result.outputs[&last.id]["upstream"].as_array().unwrap().len();
    assert_eq!(upstream, graph.nodes.len() - 1);

    let summarize = graph
        .nodes
        .iter()
        .find(|n| n.data.node_id == "ai_summarize")
        .expect("plan should include summarization");
    assert_eq!(result.log_for(&summarize.id).unwrap().step_type, "ai_summarize");
}

// ---------------------------------------------------------------------------
// Test 2: Fail-fast on an output step
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_step_stops_the_run() {
    let synthesis = synthesize(
        "Summarize the news, email me the digest, and save it to a database",
        &registry(),
    );
    let graph = synthesis.workflow;
    let email = graph
        .nodes
        .iter()
        .position(|n| n.data.node_id == "send_email")
        .expect("plan should include email");
    assert!(email + 1 < graph.nodes.len(), "email should not be the last step");

    let calls = Arc::new(AtomicUsize::new(0));
    let mut handlers = default_registry();
    handlers.register(FailOn {
        step: "send_email",
        calls: calls.clone(),
    });

    let result = WorkflowExecutor::new(handlers)
        .run(&graph, &RunContext::new())
        .await
        .unwrap();

    let failed_id = &graph.nodes[email].id;
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.failed_node.as_ref(), Some(failed_id));
    assert_eq!(result.outputs[failed_id], Value::Null);
    assert_eq!(result.logs.len(), email + 1);
    assert_eq!(result.logs.last().unwrap().status, StepStatus::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for later in &graph.nodes[email + 1..] {
        assert!(result.log_for(&later.id).is_none());
        assert!(!result.outputs.contains_key(&later.id));
    }
}

// ---------------------------------------------------------------------------
// Test 3: Hand-edited graph repaired before running
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repaired_graph_runs() {
    let raw = json!({
        "nodes": [{
            "id": "1",
            "type": "customNode",
            "position": {"x": 100, "y": 250},
            "data": {"nodeId": "translate_text", "label": "Translate", "category": "process"}
        }],
        "edges": []
    });
    let graph = Graph::from_value(raw).unwrap();
    assert!(!validate_workflow(&graph).valid);

    let mut ctx = AgentContext::new("hand-edited");
    let validated = validate_and_repair(&graph, &registry(), &mut ctx);
    assert!(validated.valid);
    assert_eq!(validated.workflow.nodes.len(), 3);
    assert!(validated.workflow.nodes[0].is_category(StepCategory::Input));

    let result = executor().run_workflow(&validated.workflow, &RunContext::new()).await;
    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.execution_order, vec!["1", "2", "3"]);
}

// ---------------------------------------------------------------------------
// Test 4: Structural errors never reach handlers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cyclic_graph_is_rejected() {
    let mut graph = synthesize("fetch rss and post to slack", &registry()).workflow;
    let first = graph.nodes[0].id.clone();
    let last = graph.nodes.last().unwrap().id.clone();
    graph.edges.push(flowsmith_types::GraphEdge {
        id: "loop".into(),
        source: last,
        target: first,
        edge_type: "smoothstep".into(),
    });

    assert!(topological_sort(&graph).has_cycle);

    let err = executor().run(&graph, &RunContext::new()).await.unwrap_err();
    assert!(matches!(err, FlowError::CycleDetected { .. }));
    assert_eq!(err.http_status(), Some(400));

    let folded = executor().run_workflow(&graph, &RunContext::new()).await;
    assert_eq!(folded.status, RunStatus::Error);
    assert!(folded.logs.is_empty());
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let result = executor()
        .run_value(json!({"nodes": []}), &RunContext::new())
        .await;
    assert_eq!(result.status, RunStatus::Error);
    assert!(result.error.unwrap().contains("edges"));
}

// ---------------------------------------------------------------------------
// Test 5: Hung and panicking handlers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hung_handler_hits_node_timeout() {
    let graph = synthesize("summarize my inbox and send it to slack", &registry()).workflow;

    let mut handlers = default_registry();
    handlers.register(Hangs);
    let events = EventEmitter::default();
    let mut rx = events.subscribe();
    let result = WorkflowExecutor::new(handlers)
        .with_config(ExecutorConfig {
            node_timeout: Some(Duration::from_millis(100)),
        })
        .with_events(events)
        .run(&graph, &RunContext::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    let failed = result.log_for(result.failed_node.as_deref().unwrap()).unwrap();
    assert_eq!(failed.step_type, "ai_summarize");
    assert!(failed.error.as_deref().unwrap().contains("timed out"));

    let mut saw_step_failed = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, RunEvent::StepFailed { .. }) {
            saw_step_failed = true;
        }
    }
    assert!(saw_step_failed);
}

#[tokio::test]
async fn panicking_handler_fails_the_run() {
    let graph = synthesize("summarize my inbox and send it to slack", &registry()).workflow;

    let mut handlers = default_registry();
    handlers.register(PanicsOnMissingInput);
    let events = EventEmitter::default();
    let mut rx = events.subscribe();
    let ctx = RunContext::new();
    let result = WorkflowExecutor::new(handlers)
        .with_events(events)
        .run_workflow(&graph, &ctx)
        .await;

    assert_eq!(result.status, RunStatus::Failed);
    let failed_node = result.failed_node.as_deref().expect("failed node should be set");
    let failed = result.log_for(failed_node).unwrap();
    assert_eq!(failed.status, StepStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("panicked"));
    assert!(result.logs.len() < graph.nodes.len());

    let mut terminal = None;
    while let Ok(event) = rx.try_recv() {
        if event.is_terminal() {
            terminal = Some(event);
        }
    }
    let terminal = terminal.expect("run should end with a terminal event");
    assert_eq!(terminal.name(), "run_failed");
    assert_eq!(terminal.run_id(), Some(ctx.run_id()));
}

// ---------------------------------------------------------------------------
// Test 6: Run context values reach handlers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_context_is_shared_with_handlers() {
    let graph = synthesize("fetch weather daily and text me", &registry()).workflow;
    let ctx = RunContext::with_values(HashMap::from([("dry_run".to_string(), json!(false))]));

    let result = executor().run(&graph, &ctx).await.unwrap();

    assert_eq!(result.run_id, ctx.run_id());
    assert!(result.logs.iter().all(|l| l.details["dryRun"] == false));
}
