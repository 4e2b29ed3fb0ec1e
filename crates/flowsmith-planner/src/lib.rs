//! Deterministic prompt-to-workflow synthesis.
//!
//! The pipeline has four stages, each usable on its own:
//!
//! 1. [`intent::parse_intent`] turns free text into an [`Intent`].
//! 2. [`planner::plan_workflow`] picks catalog steps for that intent.
//! 3. [`assembler::assemble_workflow`] lays the steps out as a linear graph.
//! 4. [`validation::validate_and_repair`] checks the graph and patches what it can.
//!
//! [`synthesize`] runs all four against one [`AgentContext`] and returns the
//! graph together with the audit trail.

pub mod assembler;
pub mod intent;
pub mod planner;
pub mod validation;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map};

use flowsmith_registry::CapabilityRegistry;
use flowsmith_types::{AgentContext, AgentSummary, Decision, Graph};

pub use assembler::{add_node_to_workflow, assemble_workflow, remove_node_from_workflow};
pub use intent::{parse_intent, ActionFamily, IntentParser};
pub use planner::plan_workflow;
pub use validation::{
    auto_repair_workflow, validate_and_repair, validate_workflow, IssueKind, RepairOutcome,
    ValidatedWorkflow, ValidationIssue, ValidationReport,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub workflow: Graph,
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub summary: AgentSummary,
}

/// Build a workflow for `prompt` from the steps in `registry`.
///
/// Never fails: an unrecognisable prompt still yields the catalog's default
/// input and output (when the catalog has them), with `valid` reporting
/// whether anything is left unresolved.
pub fn synthesize(prompt: &str, registry: &CapabilityRegistry) -> Synthesis {
    let mut ctx = AgentContext::new(prompt);
    tracing::info!(request = %ctx.id, "Synthesizing workflow");

    ctx.intent = parse_intent(prompt);
    let detected: Vec<&str> = ctx
        .intent
        .actions
        .iter()
        .map(|a| a.action_type.as_str())
        .collect();
    let decision = Decision::new(
        "intent",
        format!(
            "Detected {} action(s) [{}] with confidence {:.2}",
            detected.len(),
            detected.join(", "),
            ctx.intent.confidence
        ),
    );
    ctx.record(decision);

    let intent = ctx.intent.clone();
    let steps = plan_workflow(&intent, registry, &mut ctx);

    let mut metadata = Map::new();
    metadata.insert("prompt".into(), json!(prompt));
    metadata.insert("requestId".into(), json!(ctx.id));
    if let Some(frequency) = &intent.frequency {
        metadata.insert("frequency".into(), json!(frequency));
    }
    let graph = assemble_workflow(&steps, Some(metadata));
    ctx.record(Decision::new(
        "assembler",
        format!(
            "Assembled {} node(s) and {} edge(s)",
            graph.nodes.len(),
            graph.edges.len()
        ),
    ));
    ctx.selected_nodes = steps;

    let validated = validate_and_repair(&graph, registry, &mut ctx);
    if !validated.valid {
        tracing::warn!(
            request = %ctx.id,
            issues = validated.issues.len(),
            "Synthesized workflow still has issues"
        );
    }
    ctx.workflow = Some(validated.workflow.clone());

    let summary = ctx.finalize();
    tracing::info!(
        request = %ctx.id,
        nodes = validated.workflow.nodes.len(),
        valid = validated.valid,
        elapsed_ms = summary.processing_time,
        "Synthesis finished"
    );

    Synthesis {
        workflow: validated.workflow,
        valid: validated.valid,
        issues: validated.issues,
        summary,
    }
}
