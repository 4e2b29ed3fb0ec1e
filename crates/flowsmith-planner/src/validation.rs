//! Structural validation and best-effort auto-repair of workflow graphs.
//!
//! [`validate_workflow`] reports issues without changing anything.
//! [`auto_repair_workflow`] applies one corrective action per issue, then
//! re-validates once. Orphan and cycle issues are reported but never
//! corrected: the linear assembler cannot produce them, so they only show up
//! in graphs from other producers.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use flowsmith_registry::CapabilityRegistry;
use flowsmith_types::{AgentContext, Graph, RepairRecord, StepCategory};

use crate::assembler::{add_node_to_workflow, remove_node_from_workflow};
use crate::planner::default_planned_step;

// ---------------------------------------------------------------------------
// Issue types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueKind {
    NoNodes,
    NoInput,
    NoOutput,
    OrphanNodes {
        #[serde(rename = "nodeIds")]
        node_ids: Vec<String>,
    },
    CycleDetected {
        #[serde(rename = "nodeId")]
        node_id: String,
    },
    DuplicateNodes {
        #[serde(rename = "nodeId")]
        node_id: String,
        count: usize,
    },
}

impl IssueKind {
    pub fn name(&self) -> &'static str {
        match self {
            IssueKind::NoNodes => "no_nodes",
            IssueKind::NoInput => "no_input",
            IssueKind::NoOutput => "no_output",
            IssueKind::OrphanNodes { .. } => "orphan_nodes",
            IssueKind::CycleDetected { .. } => "cycle_detected",
            IssueKind::DuplicateNodes { .. } => "duplicate_nodes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(flatten)]
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutcome {
    pub workflow: Graph,
    pub repairs: Vec<RepairRecord>,
    pub repaired: bool,
    pub remaining_issues: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedWorkflow {
    pub workflow: Graph,
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub repairs: Vec<RepairRecord>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate_workflow(graph: &Graph) -> ValidationReport {
    let mut issues = Vec::new();

    if graph.nodes.is_empty() {
        issues.push(ValidationIssue::new(IssueKind::NoNodes, "Workflow has no nodes"));
        return ValidationReport {
            valid: false,
            issues,
        };
    }

    if !graph.has_category(StepCategory::Input) {
        issues.push(ValidationIssue::new(
            IssueKind::NoInput,
            "Workflow has no input step",
        ));
    }
    if !graph.has_category(StepCategory::Output) {
        issues.push(ValidationIssue::new(
            IssueKind::NoOutput,
            "Workflow has no output step",
        ));
    }

    if graph.nodes.len() > 1 {
        let connected: HashSet<&str> = graph
            .edges
            .iter()
            .flat_map(|e| [e.source.as_str(), e.target.as_str()])
            .collect();
        let orphans: Vec<String> = graph
            .nodes
            .iter()
            .filter(|n| !connected.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect();
        if !orphans.is_empty() {
            let message = format!("Nodes not connected to any edge: {}", orphans.join(", "));
            issues.push(ValidationIssue::new(
                IssueKind::OrphanNodes { node_ids: orphans },
                message,
            ));
        }
    }

    if let Some(node_id) = find_cycle(graph) {
        let message = format!("Cycle detected at node '{node_id}'");
        issues.push(ValidationIssue::new(IssueKind::CycleDetected { node_id }, message));
    }

    for (node_id, count) in duplicate_process_steps(graph) {
        let message = format!("Process step '{node_id}' appears {count} times");
        issues.push(ValidationIssue::new(
            IssueKind::DuplicateNodes { node_id, count },
            message,
        ));
    }

    ValidationReport {
        valid: issues.is_empty(),
        issues,
    }
}

/// DFS with an explicit recursion stack. Returns the node a back edge points at.
fn find_cycle(graph: &Graph) -> Option<String> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        on_stack: &mut HashSet<&'a str>,
    ) -> Option<&'a str> {
        visited.insert(node);
        on_stack.insert(node);
        for &next in adjacency.get(node).into_iter().flatten() {
            if on_stack.contains(next) {
                return Some(next);
            }
            if !visited.contains(next) {
                if let Some(found) = visit(next, adjacency, visited, on_stack) {
                    return Some(found);
                }
            }
        }
        on_stack.remove(node);
        None
    }

    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();
    for node in &graph.nodes {
        if visited.contains(node.id.as_str()) {
            continue;
        }
        if let Some(found) = visit(&node.id, &adjacency, &mut visited, &mut on_stack) {
            return Some(found.to_string());
        }
    }
    None
}

/// Process step ids used by more than one node, in first-seen order.
fn duplicate_process_steps(graph: &Graph) -> Vec<(String, usize)> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for node in graph.nodes.iter().filter(|n| n.is_category(StepCategory::Process)) {
        let count = counts.entry(node.data.node_id.as_str()).or_insert(0);
        if *count == 0 {
            order.push(node.data.node_id.as_str());
        }
        *count += 1;
    }
    order
        .into_iter()
        .filter_map(|id| {
            let count = counts[id];
            (count > 1).then(|| (id.to_string(), count))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Repair
// ---------------------------------------------------------------------------

pub fn auto_repair_workflow(
    graph: &Graph,
    registry: &CapabilityRegistry,
    ctx: &mut AgentContext,
) -> RepairOutcome {
    let report = validate_workflow(graph);
    if report.valid {
        return RepairOutcome {
            workflow: graph.clone(),
            repairs: Vec::new(),
            repaired: false,
            remaining_issues: Vec::new(),
        };
    }

    let mut workflow = graph.clone();
    let mut repairs = Vec::new();
    let mut changed = false;

    for issue in &report.issues {
        match &issue.kind {
            IssueKind::NoNodes => {
                changed |= insert_default(&mut workflow, registry, StepCategory::Input, issue, &mut repairs);
                changed |= insert_default(&mut workflow, registry, StepCategory::Output, issue, &mut repairs);
            }
            IssueKind::NoInput => {
                changed |= insert_default(&mut workflow, registry, StepCategory::Input, issue, &mut repairs);
            }
            IssueKind::NoOutput => {
                changed |= insert_default(&mut workflow, registry, StepCategory::Output, issue, &mut repairs);
            }
            IssueKind::DuplicateNodes { node_id, .. } => {
                let removed = remove_duplicates(&mut workflow, node_id);
                if removed > 0 {
                    changed = true;
                }
                repairs.push(
                    RepairRecord::new(
                        issue.kind.name(),
                        "remove_duplicates",
                        format!("Removed {removed} duplicate '{node_id}' step(s), kept the first"),
                    )
                    .with_node(node_id),
                );
            }
            IssueKind::OrphanNodes { .. } | IssueKind::CycleDetected { .. } => {
                tracing::warn!(issue = issue.kind.name(), message = %issue.message, "Issue left unrepaired");
                repairs.push(RepairRecord::new(
                    issue.kind.name(),
                    "logged_only",
                    format!("Not auto-corrected: {}", issue.message),
                ));
            }
        }
    }

    for repair in &repairs {
        ctx.record_repair(repair.clone());
    }

    let remaining_issues = validate_workflow(&workflow).issues;
    if !remaining_issues.is_empty() {
        tracing::warn!(remaining = remaining_issues.len(), "Workflow still invalid after repair");
    }

    RepairOutcome {
        workflow,
        repairs,
        repaired: changed,
        remaining_issues,
    }
}

fn insert_default(
    workflow: &mut Graph,
    registry: &CapabilityRegistry,
    category: StepCategory,
    issue: &ValidationIssue,
    repairs: &mut Vec<RepairRecord>,
) -> bool {
    let action = format!("insert_default_{category}");
    let reason = format!("Inserted by auto-repair: workflow had no {category} step");
    let Some(step) = default_planned_step(registry, category, reason) else {
        repairs.push(RepairRecord::new(
            issue.kind.name(),
            "unrepairable",
            format!("Catalog has no default {category} step to insert"),
        ));
        return false;
    };

    let index = match category {
        StepCategory::Input => Some(0),
        _ => None,
    };
    *workflow = add_node_to_workflow(workflow, &step, index);
    repairs.push(
        RepairRecord::new(
            issue.kind.name(),
            action,
            format!("Added default {category} step '{}'", step.node_id),
        )
        .with_node(&step.node_id),
    );
    true
}

/// Remove every process node with step id `step_id` except the first.
fn remove_duplicates(workflow: &mut Graph, step_id: &str) -> usize {
    let mut removed = 0;
    loop {
        let second = workflow
            .nodes
            .iter()
            .filter(|n| n.is_category(StepCategory::Process) && n.data.node_id == step_id)
            .nth(1)
            .map(|n| n.id.clone());
        match second {
            Some(id) => {
                *workflow = remove_node_from_workflow(workflow, &id);
                removed += 1;
            }
            None => return removed,
        }
    }
}

pub fn validate_and_repair(
    graph: &Graph,
    registry: &CapabilityRegistry,
    ctx: &mut AgentContext,
) -> ValidatedWorkflow {
    let report = validate_workflow(graph);
    if report.valid {
        return ValidatedWorkflow {
            workflow: graph.clone(),
            valid: true,
            issues: Vec::new(),
            repairs: Vec::new(),
        };
    }

    let outcome = auto_repair_workflow(graph, registry, ctx);
    ValidatedWorkflow {
        valid: outcome.remaining_issues.is_empty(),
        workflow: outcome.workflow,
        issues: outcome.remaining_issues,
        repairs: outcome.repairs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::assemble_workflow;
    use flowsmith_types::{GraphEdge, PlannedStep};
    use serde_json::json;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::builtin().unwrap()
    }

    fn step(id: &str, category: StepCategory) -> PlannedStep {
        PlannedStep {
            node_id: id.into(),
            category,
            label: id.into(),
            reason: String::new(),
            score: 0.5,
            is_fallback: false,
        }
    }

    fn has_issue(report: &ValidationReport, name: &str) -> bool {
        report.issues.iter().any(|i| i.kind.name() == name)
    }

    #[test]
    fn empty_graph_reports_no_nodes_only() {
        let report = validate_workflow(&Graph::default());
        assert!(!report.valid);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::NoNodes);
    }

    #[test]
    fn assembled_chain_is_valid() {
        let graph = assemble_workflow(
            &[
                step("rss_fetch", StepCategory::Input),
                step("ai_summarize", StepCategory::Process),
                step("send_email", StepCategory::Output),
            ],
            None,
        );
        let report = validate_workflow(&graph);
        assert!(report.valid, "issues: {:?}", report.issues);
    }

    #[test]
    fn missing_input_and_output_reported() {
        let graph = assemble_workflow(&[step("ai_summarize", StepCategory::Process)], None);
        let report = validate_workflow(&graph);
        assert!(has_issue(&report, "no_input"));
        assert!(has_issue(&report, "no_output"));
        assert!(!has_issue(&report, "orphan_nodes"), "single node is never an orphan");
    }

    #[test]
    fn orphan_nodes_reported() {
        let mut graph = assemble_workflow(
            &[
                step("rss_fetch", StepCategory::Input),
                step("send_email", StepCategory::Output),
            ],
            None,
        );
        graph.edges.clear();
        let report = validate_workflow(&graph);
        let orphan = report
            .issues
            .iter()
            .find(|i| i.kind.name() == "orphan_nodes")
            .unwrap();
        assert_eq!(
            orphan.kind,
            IssueKind::OrphanNodes {
                node_ids: vec!["1".into(), "2".into()]
            }
        );
    }

    #[test]
    fn cycle_reported() {
        let mut graph = assemble_workflow(
            &[
                step("rss_fetch", StepCategory::Input),
                step("ai_summarize", StepCategory::Process),
                step("send_email", StepCategory::Output),
            ],
            None,
        );
        graph.edges.push(GraphEdge {
            id: "e3-1".into(),
            source: "3".into(),
            target: "1".into(),
            edge_type: "smoothstep".into(),
        });
        let report = validate_workflow(&graph);
        assert!(has_issue(&report, "cycle_detected"));
    }

    #[test]
    fn duplicate_process_steps_reported_but_not_other_categories() {
        let graph = assemble_workflow(
            &[
                step("rss_fetch", StepCategory::Input),
                step("ai_summarize", StepCategory::Process),
                step("ai_summarize", StepCategory::Process),
                step("send_email", StepCategory::Output),
                step("send_email", StepCategory::Output),
            ],
            None,
        );
        let report = validate_workflow(&graph);
        let dups: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.kind.name() == "duplicate_nodes")
            .collect();
        assert_eq!(dups.len(), 1);
        assert_eq!(
            dups[0].kind,
            IssueKind::DuplicateNodes {
                node_id: "ai_summarize".into(),
                count: 2
            }
        );
    }

    #[test]
    fn issue_serializes_with_type_tag() {
        let issue = ValidationIssue::new(
            IssueKind::DuplicateNodes {
                node_id: "x".into(),
                count: 3,
            },
            "dup",
        );
        let value = serde_json::to_value(&issue).unwrap();
        assert_eq!(value, json!({"type": "duplicate_nodes", "nodeId": "x", "count": 3, "message": "dup"}));

        let no_nodes = serde_json::to_value(ValidationIssue::new(IssueKind::NoNodes, "empty")).unwrap();
        assert_eq!(no_nodes, json!({"type": "no_nodes", "message": "empty"}));
    }

    #[test]
    fn repair_single_process_node_adds_input_and_output() {
        let reg = registry();
        let mut ctx = AgentContext::new("x");
        let graph = assemble_workflow(&[step("ai_summarize", StepCategory::Process)], None);

        let outcome = auto_repair_workflow(&graph, &reg, &mut ctx);

        assert!(outcome.repaired);
        assert_eq!(outcome.workflow.nodes.len(), 3);
        assert_eq!(outcome.workflow.nodes[0].data.node_id, "manual_trigger");
        assert_eq!(outcome.workflow.nodes[1].data.node_id, "ai_summarize");
        assert_eq!(outcome.workflow.nodes[2].data.node_id, "console_log");
        assert!(outcome.remaining_issues.is_empty());
        assert!(validate_workflow(&outcome.workflow).valid);
        assert_eq!(ctx.repairs().len(), 2);
    }

    #[test]
    fn repair_empty_graph_inserts_both_defaults() {
        let reg = registry();
        let mut ctx = AgentContext::new("x");
        let outcome = auto_repair_workflow(&Graph::default(), &reg, &mut ctx);
        assert_eq!(outcome.workflow.nodes.len(), 2);
        assert_eq!(outcome.workflow.edges.len(), 1);
        assert!(outcome.remaining_issues.is_empty());
        assert!(outcome.repairs.iter().all(|r| r.issue_type == "no_nodes"));
    }

    #[test]
    fn repair_removes_all_but_first_duplicate() {
        let reg = registry();
        let mut ctx = AgentContext::new("x");
        let mut graph = assemble_workflow(
            &[
                step("rss_fetch", StepCategory::Input),
                step("ai_summarize", StepCategory::Process),
                step("ai_summarize", StepCategory::Process),
                step("ai_summarize", StepCategory::Process),
                step("send_email", StepCategory::Output),
            ],
            None,
        );
        graph.nodes[1].data.config.insert("marker".into(), json!("first"));

        let outcome = auto_repair_workflow(&graph, &reg, &mut ctx);

        let ids: Vec<_> = outcome.workflow.nodes.iter().map(|n| n.data.node_id.as_str()).collect();
        assert_eq!(ids, vec!["rss_fetch", "ai_summarize", "send_email"]);
        assert_eq!(outcome.workflow.nodes[1].data.config["marker"], "first");
        assert!(outcome.repairs[0].message.contains("Removed 2"));
        assert!(outcome.remaining_issues.is_empty());
    }

    #[test]
    fn orphans_and_cycles_are_logged_not_fixed() {
        let reg = registry();
        let mut ctx = AgentContext::new("x");
        let mut graph = assemble_workflow(
            &[
                step("rss_fetch", StepCategory::Input),
                step("send_email", StepCategory::Output),
            ],
            None,
        );
        graph.edges.push(GraphEdge {
            id: "back".into(),
            source: "2".into(),
            target: "1".into(),
            edge_type: "smoothstep".into(),
        });

        let outcome = auto_repair_workflow(&graph, &reg, &mut ctx);

        assert!(!outcome.repaired);
        assert_eq!(outcome.workflow, graph);
        assert!(outcome.repairs.iter().any(|r| r.action == "logged_only"));
        assert_eq!(outcome.remaining_issues.len(), 1);
        assert_eq!(outcome.remaining_issues[0].kind.name(), "cycle_detected");
    }

    #[test]
    fn repair_without_defaults_leaves_remaining_issues() {
        let reg = CapabilityRegistry::from_json_str("{}").unwrap();
        let mut ctx = AgentContext::new("x");
        let outcome = auto_repair_workflow(&Graph::default(), &reg, &mut ctx);
        assert!(!outcome.repaired);
        assert!(outcome.repairs.iter().all(|r| r.action == "unrepairable"));
        assert_eq!(outcome.remaining_issues[0].kind, IssueKind::NoNodes);
    }

    #[test]
    fn valid_graph_needs_no_repair() {
        let reg = registry();
        let mut ctx = AgentContext::new("x");
        let graph = assemble_workflow(
            &[
                step("rss_fetch", StepCategory::Input),
                step("send_email", StepCategory::Output),
            ],
            None,
        );
        let validated = validate_and_repair(&graph, &reg, &mut ctx);
        assert!(validated.valid);
        assert!(validated.repairs.is_empty());
        assert!(ctx.repairs().is_empty());
    }

    #[test]
    fn validate_and_repair_reports_final_validity() {
        let reg = registry();
        let mut ctx = AgentContext::new("x");
        let graph = assemble_workflow(&[step("ai_summarize", StepCategory::Process)], None);
        let validated = validate_and_repair(&graph, &reg, &mut ctx);
        assert!(validated.valid);
        assert!(validated.issues.is_empty());
        assert_eq!(validated.workflow.nodes.len(), 3);
        assert_eq!(validated.repairs.len(), 2);
    }
}
