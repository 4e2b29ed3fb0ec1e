//! Planned steps → positioned linear graph.
//!
//! Every edit is a full rebuild: the node list is spliced or filtered and then
//! every id, position, and edge is reassigned from scratch. Edits are O(n).

use serde_json::{json, Map, Value};

use flowsmith_types::{Graph, GraphEdge, GraphNode, NodeData, PlannedStep, Position, StepCategory, EDGE_TYPE, NODE_TYPE};

pub const START_X: f64 = 100.0;
pub const SPACING_X: f64 = 250.0;

/// Canvas row for each category.
pub fn row_y(category: Option<StepCategory>) -> f64 {
    match category {
        Some(StepCategory::Input) => 100.0,
        Some(StepCategory::Process) | None => 250.0,
        Some(StepCategory::Output) => 400.0,
    }
}

pub fn assemble_workflow(steps: &[PlannedStep], metadata: Option<Map<String, Value>>) -> Graph {
    let mut meta = Map::new();
    meta.insert("generatedBy".into(), json!("flowsmith-planner"));
    meta.insert("createdAt".into(), json!(chrono::Utc::now().to_rfc3339()));
    if let Some(extra) = metadata {
        meta.extend(extra);
    }
    let graph = layout(steps.iter().map(node_data).collect(), meta);
    tracing::debug!(nodes = graph.nodes.len(), edges = graph.edges.len(), "Assembled workflow");
    graph
}

/// Insert `step` at `index` (append when `None` or past the end) and rebuild.
pub fn add_node_to_workflow(graph: &Graph, step: &PlannedStep, index: Option<usize>) -> Graph {
    let mut data: Vec<NodeData> = graph.nodes.iter().map(|n| n.data.clone()).collect();
    let at = index.map_or(data.len(), |i| i.min(data.len()));
    data.insert(at, node_data(step));
    layout(data, touched(&graph.metadata))
}

/// Drop the node with graph id `node_id` and rebuild.
pub fn remove_node_from_workflow(graph: &Graph, node_id: &str) -> Graph {
    if graph.node(node_id).is_none() {
        tracing::debug!(node = node_id, "Node to remove not found; rebuilding unchanged");
    }
    let data = graph
        .nodes
        .iter()
        .filter(|n| n.id != node_id)
        .map(|n| n.data.clone())
        .collect();
    layout(data, touched(&graph.metadata))
}

fn node_data(step: &PlannedStep) -> NodeData {
    NodeData {
        node_id: step.node_id.clone(),
        label: step.label.clone(),
        category: Some(step.category),
        reason: step.reason.clone(),
        config: Map::new(),
    }
}

fn touched(metadata: &Map<String, Value>) -> Map<String, Value> {
    let mut meta = metadata.clone();
    meta.insert("updatedAt".into(), json!(chrono::Utc::now().to_rfc3339()));
    meta
}

fn layout(data: Vec<NodeData>, mut metadata: Map<String, Value>) -> Graph {
    let nodes: Vec<GraphNode> = data
        .into_iter()
        .enumerate()
        .map(|(i, data)| GraphNode {
            id: (i + 1).to_string(),
            node_type: NODE_TYPE.to_string(),
            position: Position {
                x: START_X + i as f64 * SPACING_X,
                y: row_y(data.category),
            },
            data,
        })
        .collect();

    let edges: Vec<GraphEdge> = nodes
        .windows(2)
        .map(|pair| GraphEdge {
            id: format!("e{}-{}", pair[0].id, pair[1].id),
            source: pair[0].id.clone(),
            target: pair[1].id.clone(),
            edge_type: EDGE_TYPE.to_string(),
        })
        .collect();

    metadata.insert("nodeCount".into(), json!(nodes.len()));
    metadata.insert("edgeCount".into(), json!(edges.len()));

    Graph {
        nodes,
        edges,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, category: StepCategory) -> PlannedStep {
        PlannedStep {
            node_id: id.into(),
            category,
            label: id.to_uppercase(),
            reason: format!("picked {id}"),
            score: 0.5,
            is_fallback: false,
        }
    }

    fn three_steps() -> Vec<PlannedStep> {
        vec![
            step("rss_fetch", StepCategory::Input),
            step("ai_summarize", StepCategory::Process),
            step("send_email", StepCategory::Output),
        ]
    }

    #[test]
    fn assembles_linear_chain() {
        let graph = assemble_workflow(&three_steps(), None);

        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 2);
        let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        for (k, edge) in graph.edges.iter().enumerate() {
            assert_eq!(edge.source, (k + 1).to_string());
            assert_eq!(edge.target, (k + 2).to_string());
            assert_eq!(edge.edge_type, "smoothstep");
        }
        assert!(graph.nodes.iter().all(|n| n.node_type == "customNode"));
        assert_eq!(graph.nodes[1].data.node_id, "ai_summarize");
        assert_eq!(graph.nodes[1].data.reason, "picked ai_summarize");
    }

    #[test]
    fn empty_and_single_plans() {
        let empty = assemble_workflow(&[], None);
        assert!(empty.nodes.is_empty());
        assert!(empty.edges.is_empty());

        let single = assemble_workflow(&[step("only", StepCategory::Process)], None);
        assert_eq!(single.nodes.len(), 1);
        assert!(single.edges.is_empty());
    }

    #[test]
    fn positions_follow_index_and_category_row() {
        let graph = assemble_workflow(&three_steps(), None);
        assert_eq!(graph.nodes[0].position, Position { x: 100.0, y: 100.0 });
        assert_eq!(graph.nodes[1].position, Position { x: 350.0, y: 250.0 });
        assert_eq!(graph.nodes[2].position, Position { x: 600.0, y: 400.0 });
    }

    #[test]
    fn metadata_merges_caller_keys() {
        let mut extra = Map::new();
        extra.insert("prompt".into(), json!("email me"));
        let graph = assemble_workflow(&three_steps(), Some(extra));
        assert_eq!(graph.metadata["prompt"], "email me");
        assert_eq!(graph.metadata["nodeCount"], 3);
        assert_eq!(graph.metadata["edgeCount"], 2);
        assert_eq!(graph.metadata["generatedBy"], "flowsmith-planner");
    }

    #[test]
    fn add_node_at_front_renumbers_everything() {
        let graph = assemble_workflow(&three_steps()[1..], None);
        let graph = add_node_to_workflow(&graph, &step("manual_trigger", StepCategory::Input), Some(0));

        let order: Vec<_> = graph.nodes.iter().map(|n| n.data.node_id.as_str()).collect();
        assert_eq!(order, vec!["manual_trigger", "ai_summarize", "send_email"]);
        let ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.edges[0].id, "e1-2");
        assert_eq!(graph.nodes[0].position.x, START_X);
        assert!(graph.metadata.contains_key("updatedAt"));
    }

    #[test]
    fn add_node_without_index_appends() {
        let graph = assemble_workflow(&three_steps()[..2], None);
        let graph = add_node_to_workflow(&graph, &step("console_log", StepCategory::Output), None);
        assert_eq!(graph.nodes.last().unwrap().data.node_id, "console_log");
        assert_eq!(graph.nodes.last().unwrap().id, "3");

        let past_end = add_node_to_workflow(&graph, &step("x", StepCategory::Output), Some(99));
        assert_eq!(past_end.nodes.last().unwrap().data.node_id, "x");
    }

    #[test]
    fn remove_node_rebuilds_ids_and_edges() {
        let graph = assemble_workflow(&three_steps(), None);
        let graph = remove_node_from_workflow(&graph, "2");

        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[1].id, "2");
        assert_eq!(graph.nodes[1].data.node_id, "send_email");
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].source, "1");
        assert_eq!(graph.edges[0].target, "2");
        assert_eq!(graph.metadata["nodeCount"], 2);
    }

    #[test]
    fn remove_unknown_node_is_a_noop_rebuild() {
        let graph = assemble_workflow(&three_steps(), None);
        let rebuilt = remove_node_from_workflow(&graph, "42");
        assert_eq!(rebuilt.nodes, graph.nodes);
        assert_eq!(rebuilt.edges, graph.edges);
    }

    #[test]
    fn rebuild_keeps_node_config() {
        let mut graph = assemble_workflow(&three_steps(), None);
        graph.nodes[2].data.config.insert("to".into(), json!("me@example.com"));
        let graph = remove_node_from_workflow(&graph, "1");
        assert_eq!(graph.nodes[1].data.config["to"], "me@example.com");
    }
}
